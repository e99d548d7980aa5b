//! Error types for generation

use thiserror::Error;

/// Result type for generation operations
pub type GenerateResult<T> = Result<T, GenerateError>;

/// Result type returned by tokenizer implementations
pub type TokenizerResult<T> = Result<T, TokenizerError>;

/// Errors that can occur while configuring or running a generation
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid logits: expected {expected} values, got {actual}")]
    InvalidLogits { expected: usize, actual: usize },

    #[error("Cannot sample from an empty distribution")]
    EmptyDistribution,

    #[error("KV cache full: capacity {capacity} positions")]
    CacheFull { capacity: usize },

    #[error("Invalid cache entry: {0}")]
    InvalidCacheEntry(String),

    #[error("Executor failure: {0}")]
    ExecutorFailure(#[from] ExecutorError),

    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error("Session is already running a generation")]
    SessionBusy,

    #[error("Session cache is invalid after a failed generation; reset the session first")]
    CacheInvalid,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a model executor backend.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ExecutorError(pub String);

impl ExecutorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Tokenizer error: {0}")]
    TokenizerError(String),
    #[error("Unknown token id {0}")]
    UnknownToken(u32),
}
