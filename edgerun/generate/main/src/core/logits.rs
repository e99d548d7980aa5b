//! Conversion of raw executor logits to real-valued scores.

use crate::api::error::{GenerateError, GenerateResult};
use crate::api::types::LogitsQuant;
use crate::spi::contract::RawLogits;

/// Applies the per-model requantization `(raw - offset) * scale`.
///
/// Parameters are fixed at construction and never change during generation.
#[derive(Debug, Clone)]
pub struct LogitPostprocessor {
    vocab_size: usize,
    quant: LogitsQuant,
}

impl LogitPostprocessor {
    pub fn new(vocab_size: usize, quant: LogitsQuant) -> Self {
        Self { vocab_size, quant }
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn quant(&self) -> LogitsQuant {
        self.quant
    }

    pub fn apply(&self, raw: &RawLogits) -> GenerateResult<Vec<f32>> {
        if raw.len() != self.vocab_size {
            return Err(GenerateError::InvalidLogits {
                expected: self.vocab_size,
                actual: raw.len(),
            });
        }
        let out = match raw {
            RawLogits::F32(v) => self.rescale(v.iter().copied()),
            RawLogits::U16(v) => self.rescale(v.iter().map(|&x| x as f32)),
            RawLogits::U8(v) => self.rescale(v.iter().map(|&x| x as f32)),
        };
        Ok(out)
    }

    fn rescale(&self, values: impl Iterator<Item = f32>) -> Vec<f32> {
        if self.quant.is_identity() {
            return values.collect();
        }
        let offset = self.quant.offset as f32;
        let scale = self.quant.scale;
        values.map(|v| (v - offset) * scale).collect()
    }
}
