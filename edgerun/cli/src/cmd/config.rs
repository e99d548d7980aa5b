use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use edgerun_generate::{CacheStrategy, EvalMode, PromptFormat, RunnerConfig};

#[derive(Clone, Copy, ValueEnum)]
pub enum EvalModeArg {
    /// Feed prompt tokens one at a time through the decode path.
    #[value(name = "kv", aliases = ["0", "decode-only"])]
    DecodeOnly,
    /// Prefill the prompt in one batched call, then decode.
    #[value(name = "hybrid", alias = "1")]
    Hybrid,
}

impl From<EvalModeArg> for EvalMode {
    fn from(arg: EvalModeArg) -> Self {
        match arg {
            EvalModeArg::DecodeOnly => EvalMode::DecodeOnly,
            EvalModeArg::Hybrid => EvalMode::Hybrid,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KvUpdaterArg {
    #[value(name = "smart-mask", alias = "SmartMask")]
    SmartMask,
    #[value(name = "shift-pointer", alias = "ShiftPointer")]
    ShiftPointer,
}

impl From<KvUpdaterArg> for CacheStrategy {
    fn from(arg: KvUpdaterArg) -> Self {
        match arg {
            KvUpdaterArg::SmartMask => CacheStrategy::SmartMask,
            KvUpdaterArg::ShiftPointer => CacheStrategy::ShiftPointer,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PromptFormatArg {
    Raw,
    Llama2,
    Llama3,
}

impl From<PromptFormatArg> for PromptFormat {
    fn from(arg: PromptFormatArg) -> Self {
        match arg {
            PromptFormatArg::Raw => PromptFormat::Raw,
            PromptFormatArg::Llama2 => PromptFormat::Llama2,
            PromptFormatArg::Llama3 => PromptFormat::Llama3,
        }
    }
}

/// Runner settings shared by every subcommand. Flags override the JSON file.
#[derive(Args)]
pub struct RunnerArgs {
    /// JSON file with runner settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Text placed before every prompt.
    #[arg(long)]
    system_prompt: Option<String>,

    /// Sampling temperature (0.0 = greedy).
    #[arg(long, allow_negative_numbers = true)]
    temperature: Option<f32>,

    /// Maximum total tokens per generation (prompt + output).
    #[arg(long)]
    seq_len: Option<usize>,

    /// KV cache capacity in positions.
    #[arg(long)]
    context_len: Option<usize>,

    /// Prefill path: kv (0) or hybrid (1).
    #[arg(long, value_enum)]
    eval_mode: Option<EvalModeArg>,

    /// Logits scale; 0.0 leaves executor logits unchanged.
    #[arg(long)]
    logits_scale: Option<f32>,

    /// Logits zero point.
    #[arg(long, allow_negative_numbers = true)]
    logits_offset: Option<i32>,

    /// How the KV cache is updated once full.
    #[arg(long, value_enum)]
    kv_updater: Option<KvUpdaterArg>,

    /// How many times every prompt is run.
    #[arg(long)]
    num_iters: Option<usize>,

    /// Seed for sampling; random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Template combining the system prompt and the prompt.
    #[arg(long, value_enum)]
    prompt_format: Option<PromptFormatArg>,

    /// Do not prepend the tokenizer's BOS token.
    #[arg(long)]
    no_bos: bool,

    /// Hard limit on total positions under the shift-pointer strategy.
    #[arg(long)]
    sliding_ceiling: Option<usize>,

    /// Keep the cache between generations instead of resetting it.
    #[arg(long)]
    carry_context: bool,
}

impl RunnerArgs {
    /// Load the config file (or defaults), apply flag overrides and validate.
    pub fn resolve(&self) -> Result<RunnerConfig> {
        let mut config = match self.config {
            Some(ref path) => RunnerConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => RunnerConfig::default(),
        };
        if let Some(ref s) = self.system_prompt {
            config.system_prompt = s.clone();
        }
        if let Some(t) = self.temperature {
            config.temperature = t;
        }
        if let Some(n) = self.seq_len {
            config.seq_len = n;
        }
        if let Some(n) = self.context_len {
            config.context_len = n;
        }
        if let Some(mode) = self.eval_mode {
            config.eval_mode = mode.into();
        }
        if let Some(scale) = self.logits_scale {
            config.logits_scale = scale;
        }
        if let Some(offset) = self.logits_offset {
            config.logits_offset = offset;
        }
        if let Some(updater) = self.kv_updater {
            config.kv_updater = updater.into();
        }
        if let Some(n) = self.num_iters {
            config.num_iters = n;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(format) = self.prompt_format {
            config.prompt_format = format.into();
        }
        if self.no_bos {
            config.add_bos = false;
        }
        if let Some(ceiling) = self.sliding_ceiling {
            config.sliding_ceiling = ceiling;
        }
        if self.carry_context {
            config.carry_context = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    runner: RunnerArgs,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    let config = args.runner.resolve()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
