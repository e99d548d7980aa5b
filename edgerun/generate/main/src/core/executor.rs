//! Thin adapter between the decode loop and an opaque model executor.

use std::time::Instant;

use crate::api::error::{ExecutorError, GenerateResult};
use crate::api::traits::KvCache;
use crate::api::types::TokenId;
use crate::spi::contract::{ExecutorInput, ModelExecutor, RawLogits};

/// Hands the cache read view to the executor and applies its cache writes.
pub struct ExecutorAdapter<'a> {
    executor: &'a dyn ModelExecutor,
}

impl<'a> ExecutorAdapter<'a> {
    pub fn new(executor: &'a dyn ModelExecutor) -> Self {
        Self { executor }
    }

    pub fn vocab_size(&self) -> usize {
        self.executor.vocab_size()
    }

    /// Run `tokens` at positions `start_pos..` and append one cache entry per token.
    ///
    /// Returns the raw logits of the last token. Blocks for the duration of
    /// the executor call.
    pub fn run(
        &self,
        tokens: &[TokenId],
        start_pos: usize,
        cache: &mut dyn KvCache,
    ) -> GenerateResult<RawLogits> {
        let _t = if log::log_enabled!(log::Level::Trace) { Some(Instant::now()) } else { None };

        let output = {
            let input = ExecutorInput {
                tokens,
                start_pos,
                cache: cache.read(start_pos),
            };
            self.executor.run(&input)?
        };

        if output.cache_writes.len() != tokens.len() {
            return Err(ExecutorError::new(format!(
                "expected {} cache writes, got {}",
                tokens.len(),
                output.cache_writes.len()
            ))
            .into());
        }
        for (i, write) in output.cache_writes.iter().enumerate() {
            cache.append(start_pos + i, &write.key, &write.value)?;
        }

        if let Some(t) = _t {
            log::trace!(
                "[perf] executor::run tokens={} pos={} cached={} {:.3}ms",
                tokens.len(),
                start_pos,
                cache.len(),
                t.elapsed().as_secs_f64() * 1000.0
            );
        }
        Ok(output.logits)
    }
}
