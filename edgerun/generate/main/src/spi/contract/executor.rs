use crate::api::error::ExecutorError;
use crate::api::traits::CacheView;
use crate::api::types::{CacheLayout, TokenId};

/// Logits for the last input position, in the executor's native representation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLogits {
    F32(Vec<f32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
}

impl RawLogits {
    pub fn len(&self) -> usize {
        match self {
            RawLogits::F32(v) => v.len(),
            RawLogits::U16(v) => v.len(),
            RawLogits::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key/value vectors the executor computed for one input token.
#[derive(Debug, Clone, PartialEq)]
pub struct KvWrite {
    pub key: Vec<f32>,
    pub value: Vec<f32>,
}

/// One executor invocation: `tokens[i]` sits at position `start_pos + i`.
pub struct ExecutorInput<'a> {
    pub tokens: &'a [TokenId],
    pub start_pos: usize,
    /// Cached entries visible to the first input token
    pub cache: CacheView<'a>,
}

pub struct ExecutorOutput {
    pub logits: RawLogits,
    /// One write per input token, in input order
    pub cache_writes: Vec<KvWrite>,
}

/// Compiled model backend. Treated as opaque and potentially blocking.
pub trait ModelExecutor: Send + Sync {
    fn vocab_size(&self) -> usize;

    fn cache_layout(&self) -> CacheLayout;

    /// Run the model over `input.tokens` attending to `input.cache` and causally
    /// within the batch; return logits for the last token and the cache writes.
    fn run(&self, input: &ExecutorInput<'_>) -> Result<ExecutorOutput, ExecutorError>;
}
