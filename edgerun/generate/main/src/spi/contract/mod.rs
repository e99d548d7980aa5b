mod executor;
mod tokenizer;

pub use executor::{ExecutorInput, ExecutorOutput, KvWrite, ModelExecutor, RawLogits};
pub use tokenizer::Tokenizer;
