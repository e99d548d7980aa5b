use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Args;

use edgerun_generate::{ByteTokenizer, GenerationSession, ReferenceExecutor, RunnerConfig};

use super::config::RunnerArgs;

const DEFAULT_PROMPT: &str = "The answer to the ultimate question is";

#[derive(Args)]
pub struct GenerateArgs {
    /// Prompt text. Repeat to run several prompts in order. Reads stdin if omitted.
    #[arg(long = "prompt")]
    prompts: Vec<String>,

    #[command(flatten)]
    runner: RunnerArgs,

    /// File receiving the concatenated generated text.
    #[arg(long, default_value = "outputs.txt")]
    output_path: PathBuf,

    /// File receiving one timing record per generation.
    #[arg(long, default_value = "inference_speed.txt")]
    performance_output_path: PathBuf,

    /// Print pieces to stdout as they are generated.
    #[arg(long)]
    stream: bool,
}

fn read_prompts(args: &GenerateArgs) -> Result<Vec<String>> {
    if !args.prompts.is_empty() {
        return Ok(args.prompts.clone());
    }
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(vec![DEFAULT_PROMPT.to_string()]);
    }
    let mut buf = String::new();
    stdin
        .lock()
        .read_to_string(&mut buf)
        .context("Failed to read stdin")?;
    let prompts: Vec<String> = buf
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(String::from)
        .collect();
    if prompts.is_empty() {
        bail!("No prompt provided (use --prompt or pipe text to stdin)");
    }
    Ok(prompts)
}

fn build_executor(config: &RunnerConfig) -> ReferenceExecutor {
    let executor = ReferenceExecutor::new(ByteTokenizer::VOCAB_SIZE).with_printable_bias();
    let quant = config.logits_quant();
    if quant.is_identity() {
        executor
    } else {
        executor.with_quantized_output(quant)
    }
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let config = args.runner.resolve()?;
    let prompts = read_prompts(&args)?;

    eprintln!(
        "  Runner: {} cache x {} positions, {:?}, temperature {}",
        config.kv_updater.name(),
        config.context_len,
        config.eval_mode,
        config.temperature
    );
    eprintln!("  Prompts: {} x {} iterations", prompts.len(), config.num_iters);

    let executor = Arc::new(build_executor(&config));
    let session = GenerationSession::new(executor, Arc::new(ByteTokenizer), config.clone())?;

    let mut output = String::with_capacity(5 * config.seq_len * prompts.len() * config.num_iters);
    let stream = args.stream;
    let start = Instant::now();
    let stats = session.run_prompts(&prompts, |piece| {
        output.push_str(piece);
        if stream {
            print!("{piece}");
            io::stdout().flush().ok();
        }
    })?;
    let elapsed = start.elapsed();
    if stream {
        println!();
    }

    fs::write(&args.output_path, &output)
        .with_context(|| format!("Failed to write output: {}", args.output_path.display()))?;

    let mut perf = String::new();
    for (i, s) in stats.iter().enumerate() {
        let record = serde_json::json!({
            "iteration": i / prompts.len(),
            "prompt_index": i % prompts.len(),
            "prompt_tokens": s.prompt_tokens,
            "generated_tokens": s.generated_tokens,
            "stop_reason": s.stop_reason,
            "prefill_ms": s.prefill.as_secs_f64() * 1000.0,
            "time_to_first_token_ms": s.time_to_first_token.map(|d| d.as_secs_f64() * 1000.0),
            "decode_ms": s.decode.as_secs_f64() * 1000.0,
            "prefill_tokens_per_second": s.prefill_tokens_per_second(),
            "decode_tokens_per_second": s.decode_tokens_per_second(),
        });
        perf.push_str(&record.to_string());
        perf.push('\n');
    }
    fs::write(&args.performance_output_path, perf).with_context(|| {
        format!(
            "Failed to write performance output: {}",
            args.performance_output_path.display()
        )
    })?;

    let generated: usize = stats.iter().map(|s| s.generated_tokens).sum();
    log::info!("wrote {} bytes to {}", output.len(), args.output_path.display());
    eprintln!("---");
    eprintln!(
        "  {} generations, {} tokens in {:.2}s",
        stats.len(),
        generated,
        elapsed.as_secs_f64()
    );
    Ok(())
}
