//! Independent generations over a shared executor, one session per request.

use std::sync::Arc;

use rayon::prelude::*;

use crate::api::error::GenerateResult;
use crate::api::types::{GenerationRequest, RunnerConfig};
use crate::core::orchestrator::DecodeOutcome;
use crate::core::session::GenerationSession;
use crate::spi::contract::{ModelExecutor, Tokenizer};

/// Text and outcome of one request in a batch.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub text: String,
    pub outcome: DecodeOutcome,
}

fn run_one(
    executor: &Arc<dyn ModelExecutor>,
    tokenizer: &Arc<dyn Tokenizer>,
    config: &RunnerConfig,
    request: &GenerationRequest,
) -> GenerateResult<BatchOutput> {
    let session = GenerationSession::new(Arc::clone(executor), Arc::clone(tokenizer), config.clone())?;
    let mut text = String::new();
    let outcome = session.generate(request, |piece| text.push_str(piece))?;
    Ok(BatchOutput { text, outcome })
}

/// Run requests one after another, each with its own session.
pub fn generate_batch(
    executor: Arc<dyn ModelExecutor>,
    tokenizer: Arc<dyn Tokenizer>,
    config: &RunnerConfig,
    requests: &[GenerationRequest],
) -> GenerateResult<Vec<BatchOutput>> {
    requests
        .iter()
        .map(|request| run_one(&executor, &tokenizer, config, request))
        .collect()
}

/// Run requests in parallel using rayon, each with its own session and cache.
///
/// With a fixed seed every request sees the same random stream, so results
/// match [`generate_batch`] exactly.
pub fn generate_batch_parallel(
    executor: Arc<dyn ModelExecutor>,
    tokenizer: Arc<dyn Tokenizer>,
    config: &RunnerConfig,
    requests: &[GenerationRequest],
) -> GenerateResult<Vec<BatchOutput>> {
    requests
        .par_iter()
        .map(|request| run_one(&executor, &tokenizer, config, request))
        .collect::<Result<Vec<_>, _>>()
}
