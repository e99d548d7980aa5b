//! Prefill/decode state machine for a single generation.
//!
//! `INIT` validates the request and branches on the evaluation mode: hybrid
//! passes through `PREFILL` with one batched executor call, decode-only feeds
//! the prompt through the per-step path. Both branches reach `DECODE` with the
//! same cache contents and the same seed logits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::Rng;

use crate::api::error::{GenerateError, GenerateResult};
use crate::api::traits::KvCache;
use crate::api::types::{CacheStrategy, DecodeState, EvalMode, GenerationStats, StopReason, TokenId};
use crate::core::executor::ExecutorAdapter;
use crate::core::logits::LogitPostprocessor;
use crate::core::sampling::Sampler;
use crate::spi::contract::{ModelExecutor, RawLogits, Tokenizer};

/// Tokens produced by one generation plus its timing.
#[derive(Debug, Clone)]
pub struct DecodeOutcome {
    pub generated: Vec<TokenId>,
    pub stats: GenerationStats,
}

/// Drives one generation from `INIT` to `DONE` (or `ERROR`).
///
/// An orchestrator runs exactly once; build a new one per generation.
pub struct DecodeOrchestrator<'a> {
    adapter: ExecutorAdapter<'a>,
    tokenizer: &'a dyn Tokenizer,
    postprocessor: &'a LogitPostprocessor,
    sampler: Sampler,
    mode: EvalMode,
    sliding_ceiling: usize,
    cancel: Option<&'a AtomicBool>,
    state: DecodeState,
}

impl<'a> DecodeOrchestrator<'a> {
    pub fn new(
        executor: &'a dyn ModelExecutor,
        tokenizer: &'a dyn Tokenizer,
        postprocessor: &'a LogitPostprocessor,
        sampler: Sampler,
        mode: EvalMode,
    ) -> Self {
        Self {
            adapter: ExecutorAdapter::new(executor),
            tokenizer,
            postprocessor,
            sampler,
            mode,
            sliding_ceiling: usize::MAX,
            cancel: None,
            state: DecodeState::Init,
        }
    }

    /// Upper bound on total positions under the shift-pointer strategy.
    pub fn with_sliding_ceiling(mut self, ceiling: usize) -> Self {
        self.sliding_ceiling = ceiling;
        self
    }

    /// Flag checked between decode steps; never inside an executor call.
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Run the generation, streaming each decoded piece to `on_piece`.
    ///
    /// On failure the cache is reset and the orchestrator ends in `ERROR`;
    /// `on_piece` is not called again after the error.
    pub fn run<R, F>(
        &mut self,
        prompt: &[TokenId],
        max_total_len: usize,
        cache: &mut dyn KvCache,
        rng: &mut R,
        on_piece: F,
    ) -> GenerateResult<DecodeOutcome>
    where
        R: Rng + ?Sized,
        F: FnMut(&str),
    {
        if self.state != DecodeState::Init {
            return Err(GenerateError::Configuration(format!(
                "orchestrator already ran (state {:?})",
                self.state
            )));
        }
        match self.drive(prompt, max_total_len, cache, rng, on_piece) {
            Ok(outcome) => {
                self.transition(DecodeState::Done);
                Ok(outcome)
            }
            Err(e) => {
                log::warn!("generation failed in {:?}: {}; discarding cache", self.state, e);
                self.transition(DecodeState::Error);
                cache.reset();
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: DecodeState) {
        log::debug!("decode state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn validate(
        &self,
        prompt: &[TokenId],
        max_total_len: usize,
        start_pos: usize,
        cache: &dyn KvCache,
    ) -> GenerateResult<()> {
        if prompt.is_empty() {
            return Err(GenerateError::Configuration("prompt is empty after tokenization".into()));
        }
        if max_total_len == 0 {
            return Err(GenerateError::Configuration("maximum length must be > 0".into()));
        }
        if max_total_len <= prompt.len() {
            return Err(GenerateError::Configuration(format!(
                "maximum length ({}) leaves no room after a {}-token prompt",
                max_total_len,
                prompt.len()
            )));
        }
        if self.adapter.vocab_size() != self.postprocessor.vocab_size() {
            return Err(GenerateError::Configuration(format!(
                "executor vocabulary ({}) differs from postprocessor vocabulary ({})",
                self.adapter.vocab_size(),
                self.postprocessor.vocab_size()
            )));
        }
        let capacity = cache.capacity();
        match cache.strategy() {
            CacheStrategy::SmartMask => {
                if start_pos + prompt.len() >= capacity {
                    return Err(GenerateError::Configuration(format!(
                        "prompt of {} tokens at position {} leaves no free slot in a cache of {}",
                        prompt.len(),
                        start_pos,
                        capacity
                    )));
                }
                if start_pos + max_total_len > capacity {
                    log::debug!(
                        "maximum length {} exceeds smart-mask capacity {}; decoding stops at capacity",
                        max_total_len,
                        capacity
                    );
                }
            }
            CacheStrategy::ShiftPointer => {
                if prompt.len() > capacity {
                    return Err(GenerateError::Configuration(format!(
                        "prompt of {} tokens exceeds cache capacity {}",
                        prompt.len(),
                        capacity
                    )));
                }
                if start_pos + max_total_len > self.sliding_ceiling {
                    return Err(GenerateError::Configuration(format!(
                        "maximum length {} at position {} exceeds the ceiling of {} positions",
                        max_total_len, start_pos, self.sliding_ceiling
                    )));
                }
            }
        }
        Ok(())
    }

    /// Prompt tokens one batched call can take without spanning an eviction.
    ///
    /// A shift-pointer batch starting at `start_pos` sees the window as it was
    /// before the call; a token at position `p` fed alone sees positions
    /// `p - capacity..p`. The two agree only while `p <= capacity`, so once
    /// the window has slid the rest of the prompt goes one token at a time.
    fn prefill_batch_len(prompt_len: usize, start_pos: usize, cache: &dyn KvCache) -> usize {
        match cache.strategy() {
            CacheStrategy::SmartMask => prompt_len,
            CacheStrategy::ShiftPointer => (cache.capacity() + 1)
                .saturating_sub(start_pos)
                .clamp(1, prompt_len),
        }
    }

    fn feed_prompt_stepwise(
        &self,
        prompt: &[TokenId],
        start_pos: usize,
        cache: &mut dyn KvCache,
    ) -> GenerateResult<RawLogits> {
        let mut last = None;
        for (i, &token) in prompt.iter().enumerate() {
            last = Some(self.adapter.run(&[token], start_pos + i, cache)?);
        }
        last.ok_or_else(|| GenerateError::Configuration("prompt is empty after tokenization".into()))
    }

    fn is_eos(&self, token: TokenId) -> bool {
        self.tokenizer.eos_token_ids().contains(&token)
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    fn drive<R, F>(
        &mut self,
        prompt: &[TokenId],
        max_total_len: usize,
        cache: &mut dyn KvCache,
        rng: &mut R,
        mut on_piece: F,
    ) -> GenerateResult<DecodeOutcome>
    where
        R: Rng + ?Sized,
        F: FnMut(&str),
    {
        let started = Instant::now();
        let start_pos = cache.next_position();
        self.validate(prompt, max_total_len, start_pos, cache)?;

        let mut logits = match self.mode {
            EvalMode::Hybrid => {
                self.transition(DecodeState::Prefill);
                let batch_len = Self::prefill_batch_len(prompt.len(), start_pos, cache);
                let mut logits = self.adapter.run(&prompt[..batch_len], start_pos, cache)?;
                if batch_len < prompt.len() {
                    log::debug!(
                        "prefill batch of {} tokens; {} fed stepwise past the window edge",
                        batch_len,
                        prompt.len() - batch_len
                    );
                    logits = self.feed_prompt_stepwise(&prompt[batch_len..], start_pos + batch_len, cache)?;
                }
                self.transition(DecodeState::Decode);
                logits
            }
            EvalMode::DecodeOnly => {
                self.transition(DecodeState::Decode);
                self.feed_prompt_stepwise(prompt, start_pos, cache)?
            }
        };
        let prefill = started.elapsed();

        let decode_started = Instant::now();
        let mut generated = Vec::new();
        let mut time_to_first_token = None;
        // Position the next sampled token will occupy.
        let mut pos = start_pos + prompt.len();

        let stop_reason = loop {
            let scores = self.postprocessor.apply(&logits)?;
            let token = self.sampler.sample(&scores, rng)?;
            if self.is_eos(token) {
                break StopReason::EndOfSequence;
            }

            let piece = self.tokenizer.decode(token)?;
            generated.push(token);
            time_to_first_token.get_or_insert_with(|| started.elapsed());
            on_piece(&piece);

            if prompt.len() + generated.len() >= max_total_len {
                break StopReason::MaxLength;
            }
            if cache.strategy() == CacheStrategy::SmartMask && pos + 1 >= cache.capacity() {
                break StopReason::CacheCapacity;
            }
            if self.cancelled() {
                break StopReason::Cancelled;
            }

            logits = self.adapter.run(&[token], pos, cache)?;
            pos += 1;
        };

        let stats = GenerationStats {
            prompt_tokens: prompt.len(),
            generated_tokens: generated.len(),
            stop_reason,
            prefill,
            time_to_first_token,
            decode: decode_started.elapsed(),
        };
        log::debug!(
            "[perf] generate prompt={} generated={} stop={:?} prefill={:.3}ms decode={:.1} tok/s",
            stats.prompt_tokens,
            stats.generated_tokens,
            stats.stop_reason,
            stats.prefill.as_secs_f64() * 1000.0,
            stats.decode_tokens_per_second()
        );
        Ok(DecodeOutcome { generated, stats })
    }
}
