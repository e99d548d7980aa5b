//! # Edgerun Generate
//!
//! Autoregressive text-generation core for on-device LLM runners.
//!
//! This crate provides:
//! - Logit postprocessing for quantized executor outputs
//! - Greedy and temperature sampling with an injected random source
//! - KV cache management with two update strategies (smart mask, shift pointer)
//! - A prefill/decode state machine driving an opaque model executor
//! - Generation sessions with streaming callbacks and per-iteration timing
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use edgerun_generate::{
//!     ByteTokenizer, GenerationRequest, GenerationSession, ReferenceExecutor, RunnerConfig,
//! };
//!
//! let config = RunnerConfig::default();
//! let executor = Arc::new(ReferenceExecutor::new(ByteTokenizer::VOCAB_SIZE));
//! let session = GenerationSession::new(executor, Arc::new(ByteTokenizer), config)?;
//!
//! let request = GenerationRequest::new("Hello", 32);
//! let outcome = session.generate(&request, |piece| print!("{piece}"))?;
//! println!("\n{:.1} tok/s", outcome.stats.decode_tokens_per_second());
//! ```

pub mod api;
pub mod spi;
pub(crate) mod core;
mod saf;

pub use saf::*;
