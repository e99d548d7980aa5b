//! Deterministic toy executor with real attention over the cache.
//!
//! Keys and values are pseudo-random functions of (token, position); the last
//! token's logits come from single-query attention over every visible entry.
//! Visible entries are always traversed oldest first, so a batched call and a
//! sequence of single-token calls produce bit-identical results.

use crate::api::error::ExecutorError;
use crate::api::types::{CacheLayout, LogitsQuant, TokenId};
use crate::spi::contract::{ExecutorInput, ExecutorOutput, KvWrite, ModelExecutor, RawLogits};

const KEY_SALT: u64 = 0x4b45_5953;
const VALUE_SALT: u64 = 0x5641_4c53;
const QUERY_SALT: u64 = 0x5155_4552;
const EMBED_SALT: u64 = 0x454d_4244;

/// Penalty applied to non-printable byte tokens when the printable bias is on.
const UNPRINTABLE_PENALTY: f32 = 16.0;

pub struct ReferenceExecutor {
    vocab_size: usize,
    layout: CacheLayout,
    quant: Option<LogitsQuant>,
    printable_bias: bool,
}

impl ReferenceExecutor {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            layout: CacheLayout::new(2, 2, 8),
            quant: None,
            printable_bias: false,
        }
    }

    pub fn with_layout(mut self, layout: CacheLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Emit `U16` logits quantized with `quant` instead of `F32`.
    pub fn with_quantized_output(mut self, quant: LogitsQuant) -> Self {
        self.quant = if quant.is_identity() { None } else { Some(quant) };
        self
    }

    /// Push ids outside printable ASCII down so byte-level output stays readable.
    pub fn with_printable_bias(mut self) -> Self {
        self.printable_bias = true;
        self
    }

    fn key(&self, token: TokenId, position: usize) -> Vec<f32> {
        let width = self.layout.entry_width();
        (0..width)
            .map(|j| {
                let freq = 1.0 / (1.0 + j as f32);
                feature(KEY_SALT, token as u64, j as u64) + 0.25 * (position as f32 * freq).cos()
            })
            .collect()
    }

    fn value(&self, token: TokenId) -> Vec<f32> {
        let width = self.layout.entry_width();
        (0..width)
            .map(|j| feature(VALUE_SALT, token as u64, j as u64))
            .collect()
    }

    fn logits(&self, query_token: TokenId, keys: &[&[f32]], values: &[&[f32]]) -> Vec<f32> {
        let width = self.layout.entry_width();
        let query: Vec<f32> = (0..width)
            .map(|j| feature(QUERY_SALT, query_token as u64, j as u64))
            .collect();

        let scale = 1.0 / (width as f32).sqrt();
        let scores: Vec<f32> = keys.iter().map(|k| dot(&query, k) * scale).collect();
        let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
        let sum: f32 = exps.iter().sum();

        let mut context = vec![0.0f32; width];
        for (w, v) in exps.iter().zip(values) {
            let w = w / sum;
            for (c, x) in context.iter_mut().zip(v.iter()) {
                *c += w * x;
            }
        }

        (0..self.vocab_size)
            .map(|id| {
                let embed: Vec<f32> = (0..width)
                    .map(|j| feature(EMBED_SALT, id as u64, j as u64))
                    .collect();
                let mut logit = 4.0 * dot(&context, &embed);
                if self.printable_bias && !(32..127).contains(&id) {
                    logit -= UNPRINTABLE_PENALTY;
                }
                logit
            })
            .collect()
    }

    fn encode_logits(&self, logits: Vec<f32>) -> RawLogits {
        match self.quant {
            None => RawLogits::F32(logits),
            Some(q) => RawLogits::U16(
                logits
                    .into_iter()
                    .map(|l| (l / q.scale + q.offset as f32).round().clamp(0.0, u16::MAX as f32) as u16)
                    .collect(),
            ),
        }
    }
}

impl ModelExecutor for ReferenceExecutor {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn cache_layout(&self) -> CacheLayout {
        self.layout
    }

    fn run(&self, input: &ExecutorInput<'_>) -> Result<ExecutorOutput, ExecutorError> {
        let last = *input
            .tokens
            .last()
            .ok_or_else(|| ExecutorError::new("no input tokens"))?;
        if let Some(&bad) = input.tokens.iter().find(|&&t| t as usize >= self.vocab_size) {
            return Err(ExecutorError::new(format!(
                "token {} outside vocabulary of {}",
                bad, self.vocab_size
            )));
        }
        let width = self.layout.entry_width();
        if input.cache.iter().any(|e| e.key.len() != width || e.value.len() != width) {
            return Err(ExecutorError::new("cache entry width does not match layout"));
        }

        let cache_writes: Vec<KvWrite> = input
            .tokens
            .iter()
            .enumerate()
            .map(|(i, &t)| KvWrite {
                key: self.key(t, input.start_pos + i),
                value: self.value(t),
            })
            .collect();

        let mut keys: Vec<&[f32]> = input.cache.iter().map(|e| e.key).collect();
        let mut values: Vec<&[f32]> = input.cache.iter().map(|e| e.value).collect();
        keys.extend(cache_writes.iter().map(|w| w.key.as_slice()));
        values.extend(cache_writes.iter().map(|w| w.value.as_slice()));

        let logits = self.logits(last, &keys, &values);
        Ok(ExecutorOutput {
            logits: self.encode_logits(logits),
            cache_writes,
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// splitmix64-derived value in [-1, 1).
fn feature(salt: u64, a: u64, b: u64) -> f32 {
    let mut z = salt
        .wrapping_add(a.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(b.wrapping_mul(0xBF58_476D_1CE4_E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    ((z >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
}
