//! Self-contained collaborators for running the core without a backend.

mod executor;
mod tokenizer;

pub use executor::ReferenceExecutor;
pub use tokenizer::ByteTokenizer;
