//! Collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Mutex;

use edgerun_generate::{
    ByteTokenizer, CacheLayout, ExecutorError, ExecutorInput, ExecutorOutput, KvWrite, ModelExecutor,
    RawLogits, ReferenceExecutor, TokenId, Tokenizer, TokenizerResult,
};

/// Byte tokenizer with no end-of-sequence id, so length and capacity stops
/// are the only way a generation ends.
pub struct NoEosTokenizer;

impl Tokenizer for NoEosTokenizer {
    fn encode(&self, text: &str) -> TokenizerResult<Vec<TokenId>> {
        ByteTokenizer.encode(text)
    }

    fn decode(&self, token: TokenId) -> TokenizerResult<String> {
        ByteTokenizer.decode(token)
    }

    fn vocab_size(&self) -> usize {
        ByteTokenizer::VOCAB_SIZE
    }

    fn bos_token_id(&self) -> Option<TokenId> {
        Some(ByteTokenizer::BOS)
    }
}

/// Predicts `script[i]` on the i-th call (repeating the last entry).
pub struct ScriptExecutor {
    script: Vec<TokenId>,
    calls: AtomicUsize,
}

impl ScriptExecutor {
    pub fn new(script: &[TokenId]) -> Self {
        Self {
            script: script.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ModelExecutor for ScriptExecutor {
    fn vocab_size(&self) -> usize {
        ByteTokenizer::VOCAB_SIZE
    }

    fn cache_layout(&self) -> CacheLayout {
        CacheLayout::new(1, 1, 2)
    }

    fn run(&self, input: &ExecutorInput<'_>) -> Result<ExecutorOutput, ExecutorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script[call.min(self.script.len() - 1)] as usize;
        let mut logits = vec![0.0f32; ByteTokenizer::VOCAB_SIZE];
        logits[next] = 1.0;
        let cache_writes = input
            .tokens
            .iter()
            .map(|&t| KvWrite {
                key: vec![t as f32, 0.0],
                value: vec![0.0, t as f32],
            })
            .collect();
        Ok(ExecutorOutput {
            logits: RawLogits::F32(logits),
            cache_writes,
        })
    }
}

/// Reference executor that fails exactly once, on the `fail_on`-th call.
pub struct FlakyExecutor {
    inner: ReferenceExecutor,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FlakyExecutor {
    pub fn new(fail_on: usize) -> Self {
        Self {
            inner: ReferenceExecutor::new(ByteTokenizer::VOCAB_SIZE),
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

impl ModelExecutor for FlakyExecutor {
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn cache_layout(&self) -> CacheLayout {
        self.inner.cache_layout()
    }

    fn run(&self, input: &ExecutorInput<'_>) -> Result<ExecutorOutput, ExecutorError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(ExecutorError::new("device lost"));
        }
        self.inner.run(input)
    }
}

/// Reference executor whose first call signals `entered` and then blocks
/// until `release` fires.
pub struct GatedExecutor {
    inner: ReferenceExecutor,
    entered: Mutex<Option<Sender<()>>>,
    release: Mutex<Receiver<()>>,
}

impl GatedExecutor {
    pub fn new(entered: Sender<()>, release: Receiver<()>) -> Self {
        Self {
            inner: ReferenceExecutor::new(ByteTokenizer::VOCAB_SIZE),
            entered: Mutex::new(Some(entered)),
            release: Mutex::new(release),
        }
    }
}

impl ModelExecutor for GatedExecutor {
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn cache_layout(&self) -> CacheLayout {
        self.inner.cache_layout()
    }

    fn run(&self, input: &ExecutorInput<'_>) -> Result<ExecutorOutput, ExecutorError> {
        let gate = self.entered.lock().unwrap().take();
        if let Some(entered) = gate {
            entered.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        self.inner.run(input)
    }
}
