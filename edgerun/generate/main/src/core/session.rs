//! Per-prompt generation lifecycle over one owned KV cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::api::error::{GenerateError, GenerateResult};
use crate::api::traits::KvCache;
use crate::api::types::{CacheStrategy, GenerationRequest, GenerationStats, RunnerConfig};
use crate::core::kv_cache::new_kv_cache;
use crate::core::logits::LogitPostprocessor;
use crate::core::orchestrator::{DecodeOrchestrator, DecodeOutcome};
use crate::core::prompt::encode_prompt;
use crate::core::sampling::Sampler;
use crate::spi::contract::{ModelExecutor, Tokenizer};

struct SessionState {
    cache: Box<dyn KvCache>,
    rng: StdRng,
    stats: Vec<GenerationStats>,
    /// Set after a failed generation; cleared by `reset`.
    invalid: bool,
}

/// Owns one cache and runs generations against it, one at a time.
///
/// A second `generate` while one is in flight fails with
/// [`GenerateError::SessionBusy`] instead of waiting. Independent sessions
/// share nothing and can run on separate threads.
pub struct GenerationSession {
    executor: Arc<dyn ModelExecutor>,
    tokenizer: Arc<dyn Tokenizer>,
    config: RunnerConfig,
    postprocessor: LogitPostprocessor,
    sampler: Sampler,
    cancel: Arc<AtomicBool>,
    state: Mutex<SessionState>,
}

impl GenerationSession {
    pub fn new(
        executor: Arc<dyn ModelExecutor>,
        tokenizer: Arc<dyn Tokenizer>,
        config: RunnerConfig,
    ) -> GenerateResult<Self> {
        config.validate()?;
        if tokenizer.vocab_size() > executor.vocab_size() {
            return Err(GenerateError::Configuration(format!(
                "tokenizer vocabulary ({}) is larger than executor vocabulary ({})",
                tokenizer.vocab_size(),
                executor.vocab_size()
            )));
        }
        let cache = new_kv_cache(config.kv_updater, config.context_len, executor.cache_layout())?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let postprocessor = LogitPostprocessor::new(executor.vocab_size(), config.logits_quant());
        let sampler = Sampler::new(config.temperature);

        Ok(Self {
            executor,
            tokenizer,
            config,
            postprocessor,
            sampler,
            cancel: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(SessionState {
                cache,
                rng,
                stats: Vec::new(),
                invalid: false,
            }),
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.config.kv_updater
    }

    /// Flag that stops the running generation after its current step.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn lock(&self) -> GenerateResult<MutexGuard<'_, SessionState>> {
        match self.state.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(GenerateError::SessionBusy),
            Err(TryLockError::Poisoned(poisoned)) => {
                // A callback panicked mid-generation; the cache cannot be trusted.
                let mut guard = poisoned.into_inner();
                guard.invalid = true;
                self.state.clear_poison();
                Ok(guard)
            }
        }
    }

    /// Run one request, streaming decoded pieces to `on_piece` in order.
    pub fn generate<F>(&self, request: &GenerationRequest, on_piece: F) -> GenerateResult<DecodeOutcome>
    where
        F: FnMut(&str),
    {
        let mut guard = self.lock()?;
        if guard.invalid {
            return Err(GenerateError::CacheInvalid);
        }
        if let Some(requested) = request.strategy {
            if requested != guard.cache.strategy() {
                return Err(GenerateError::Configuration(format!(
                    "session cache uses {}; cannot switch to {}",
                    guard.cache.strategy().name(),
                    requested.name()
                )));
            }
        }
        if !self.config.carry_context {
            guard.cache.reset();
        }
        self.cancel.store(false, Ordering::Release);

        let state = &mut *guard;
        let result = self.run_locked(state, request, on_piece);
        match result {
            Ok(outcome) => {
                state.stats.push(outcome.stats.clone());
                Ok(outcome)
            }
            Err(GenerateError::Configuration(msg)) => Err(GenerateError::Configuration(msg)),
            Err(e) => {
                state.cache.reset();
                state.invalid = true;
                Err(e)
            }
        }
    }

    fn run_locked<F>(
        &self,
        state: &mut SessionState,
        request: &GenerationRequest,
        on_piece: F,
    ) -> GenerateResult<DecodeOutcome>
    where
        F: FnMut(&str),
    {
        let system_prompt = if request.system_prompt.is_empty() {
            self.config.system_prompt.as_str()
        } else {
            request.system_prompt.as_str()
        };
        let prompt = encode_prompt(
            self.tokenizer.as_ref(),
            self.config.prompt_format,
            system_prompt,
            &request.prompt,
            self.config.add_bos,
        )?;

        let mut orchestrator = DecodeOrchestrator::new(
            self.executor.as_ref(),
            self.tokenizer.as_ref(),
            &self.postprocessor,
            self.sampler,
            self.config.eval_mode,
        )
        .with_sliding_ceiling(self.config.sliding_ceiling)
        .with_cancel_flag(&self.cancel);

        orchestrator.run(
            &prompt,
            request.max_total_len,
            state.cache.as_mut(),
            &mut state.rng,
            on_piece,
        )
    }

    /// Run every prompt `num_iters` times, in order, with the configured
    /// system prompt and `seq_len`. Stops at the first error.
    pub fn run_prompts<F>(&self, prompts: &[String], mut on_piece: F) -> GenerateResult<Vec<GenerationStats>>
    where
        F: FnMut(&str),
    {
        let mut all = Vec::with_capacity(prompts.len() * self.config.num_iters);
        for iter in 0..self.config.num_iters {
            for (i, prompt) in prompts.iter().enumerate() {
                log::debug!("iteration {} prompt {}", iter, i);
                let request = GenerationRequest::new(prompt.clone(), self.config.seq_len)
                    .with_system_prompt(self.config.system_prompt.clone());
                let outcome = self.generate(&request, &mut on_piece)?;
                all.push(outcome.stats);
            }
        }
        Ok(all)
    }

    /// Clear the cache and the invalid flag so the session can be reused.
    pub fn reset(&self) -> GenerateResult<()> {
        let mut guard = self.lock()?;
        guard.cache.reset();
        guard.invalid = false;
        Ok(())
    }

    /// Timing of every successful generation since the last `take_stats`.
    pub fn stats(&self) -> GenerateResult<Vec<GenerationStats>> {
        Ok(self.lock()?.stats.clone())
    }

    /// Drain the recorded timing, leaving the session's list empty.
    pub fn take_stats(&self) -> GenerateResult<Vec<GenerationStats>> {
        Ok(std::mem::take(&mut self.lock()?.stats))
    }

    /// Positions currently readable from the cache, oldest first.
    pub fn cached_positions(&self) -> GenerateResult<Vec<usize>> {
        let guard = self.lock()?;
        let end = guard.cache.next_position();
        Ok(guard.cache.read(end).positions())
    }

    pub fn is_invalid(&self) -> GenerateResult<bool> {
        Ok(self.lock()?.invalid)
    }
}
