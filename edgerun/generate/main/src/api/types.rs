//! Public configuration and result types for generation

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::error::{GenerateError, GenerateResult};

/// Token identifier from a fixed vocabulary.
pub type TokenId = u32;

/// How the KV cache admits new positions. Fixed for the lifetime of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Positions map 1:1 to pre-allocated slots; a validity mask hides unwritten slots.
    /// Generation cannot go past the slot count.
    #[default]
    #[serde(alias = "SmartMask")]
    SmartMask,
    /// Slots are reused in ring order once full; only the most recent
    /// `capacity` positions stay readable.
    #[serde(alias = "ShiftPointer")]
    ShiftPointer,
}

impl CacheStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            CacheStrategy::SmartMask => "smart_mask",
            CacheStrategy::ShiftPointer => "shift_pointer",
        }
    }
}

/// How prompt tokens reach the cache before decoding starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    /// Prompt tokens go through the per-step path one at a time.
    #[serde(alias = "kv")]
    DecodeOnly,
    /// All prompt tokens are submitted in one batched executor call.
    #[default]
    Hybrid,
}

/// Layout used to combine the system prompt with the user prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptFormat {
    #[default]
    Raw,
    Llama2,
    Llama3,
}

/// Affine parameters for requantizing executor logits: `(raw - offset) * scale`.
///
/// A scale of exactly zero means the raw values are already real-valued.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LogitsQuant {
    pub scale: f32,
    pub offset: i32,
}

impl LogitsQuant {
    pub fn new(scale: f32, offset: i32) -> Self {
        Self { scale, offset }
    }

    /// True when no rescaling should be applied.
    pub fn is_identity(&self) -> bool {
        self.scale == 0.0
    }
}

/// Shape of one cached position: every layer and KV head stores a
/// `head_dim` key vector and a `head_dim` value vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLayout {
    pub num_layers: usize,
    pub num_kv_heads: usize,
    pub head_dim: usize,
}

impl CacheLayout {
    pub fn new(num_layers: usize, num_kv_heads: usize, head_dim: usize) -> Self {
        Self {
            num_layers,
            num_kv_heads,
            head_dim,
        }
    }

    /// Number of f32 values in the key (or value) of a single position.
    pub fn entry_width(&self) -> usize {
        self.num_layers * self.num_kv_heads * self.head_dim
    }
}

/// Runner configuration.
///
/// Every field has a default so partial JSON files are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// KV cache capacity in positions
    pub context_len: usize,
    /// Default maximum total length (prompt + generated) per request
    pub seq_len: usize,
    /// Cache update strategy
    pub kv_updater: CacheStrategy,
    /// Prefill path selection
    pub eval_mode: EvalMode,
    /// Sampling temperature (0.0 or below = greedy argmax)
    pub temperature: f32,
    /// Logits scale; 0.0 disables requantization
    pub logits_scale: f32,
    /// Logits zero point
    pub logits_offset: i32,
    /// How many times every prompt is run
    pub num_iters: usize,
    /// Text placed before the user prompt
    pub system_prompt: String,
    pub prompt_format: PromptFormat,
    /// Prepend the tokenizer's BOS id to every prompt
    pub add_bos: bool,
    /// Seed for the sampling RNG; entropy-seeded when absent
    pub seed: Option<u64>,
    /// Hard limit on total positions under the shift-pointer strategy
    pub sliding_ceiling: usize,
    /// Keep cache contents between generations on one session
    pub carry_context: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            context_len: 128,
            seq_len: 128,
            kv_updater: CacheStrategy::SmartMask,
            eval_mode: EvalMode::Hybrid,
            temperature: 0.0,
            logits_scale: 0.0,
            logits_offset: 0,
            num_iters: 1,
            system_prompt: String::new(),
            prompt_format: PromptFormat::Raw,
            add_bos: true,
            seed: None,
            sliding_ceiling: 4096,
            carry_context: false,
        }
    }
}

impl RunnerConfig {
    /// Load a RunnerConfig from a JSON file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> GenerateResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: RunnerConfig = serde_json::from_reader(reader)
            .map_err(|e| GenerateError::Configuration(format!("invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn logits_quant(&self) -> LogitsQuant {
        LogitsQuant::new(self.logits_scale, self.logits_offset)
    }

    pub fn validate(&self) -> GenerateResult<()> {
        if self.context_len == 0 {
            return Err(GenerateError::Configuration("context_len must be > 0".into()));
        }
        if self.seq_len == 0 {
            return Err(GenerateError::Configuration("seq_len must be > 0".into()));
        }
        if self.num_iters == 0 {
            return Err(GenerateError::Configuration("num_iters must be > 0".into()));
        }
        if !self.temperature.is_finite() {
            return Err(GenerateError::Configuration(format!(
                "temperature must be finite, got {}",
                self.temperature
            )));
        }
        if !self.logits_scale.is_finite() || self.logits_scale < 0.0 {
            return Err(GenerateError::Configuration(format!(
                "logits_scale must be finite and >= 0.0, got {}",
                self.logits_scale
            )));
        }
        if self.kv_updater == CacheStrategy::ShiftPointer && self.sliding_ceiling < self.context_len {
            return Err(GenerateError::Configuration(format!(
                "sliding_ceiling ({}) must be >= context_len ({})",
                self.sliding_ceiling, self.context_len
            )));
        }
        Ok(())
    }
}

/// One generation request. Read-only once accepted.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub prompt: String,
    /// Maximum total length (prompt + generated tokens)
    pub max_total_len: usize,
    /// Strategy the caller expects; must match the session's if set.
    pub strategy: Option<CacheStrategy>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_total_len: usize) -> Self {
        Self {
            system_prompt: String::new(),
            prompt: prompt.into(),
            max_total_len,
            strategy: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// States of the decode state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Init,
    Prefill,
    Decode,
    Done,
    Error,
}

impl DecodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DecodeState::Done | DecodeState::Error)
    }
}

/// Why decoding stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Prompt plus generated tokens reached the requested maximum
    MaxLength,
    /// The sampler produced an end-of-sequence token
    EndOfSequence,
    /// Smart-mask cache has no slot for another position
    CacheCapacity,
    /// The session's cancel flag was raised between steps
    Cancelled,
}

/// Per-generation timing and counts. Observational only.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationStats {
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
    pub stop_reason: StopReason,
    /// Time spent getting prompt tokens into the cache
    pub prefill: Duration,
    /// Time from the start of the generation to the first streamed token
    pub time_to_first_token: Option<Duration>,
    /// Time spent in the decode loop
    pub decode: Duration,
}

impl GenerationStats {
    /// Decode throughput in tokens per second.
    pub fn decode_tokens_per_second(&self) -> f64 {
        let secs = self.decode.as_secs_f64();
        if secs > 0.0 {
            self.generated_tokens as f64 / secs
        } else {
            0.0
        }
    }

    /// Prompt throughput in tokens per second.
    pub fn prefill_tokens_per_second(&self) -> f64 {
        let secs = self.prefill.as_secs_f64();
        if secs > 0.0 {
            self.prompt_tokens as f64 / secs
        } else {
            0.0
        }
    }
}
