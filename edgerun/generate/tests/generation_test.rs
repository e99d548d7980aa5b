//! End-to-end generation behaviour through the public session API.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{FlakyExecutor, NoEosTokenizer, ScriptExecutor};
use edgerun_generate::{
    ByteTokenizer, CacheStrategy, EvalMode, GenerateError, GenerationRequest, GenerationSession,
    LogitPostprocessor, LogitsQuant, RawLogits, ReferenceExecutor, RunnerConfig, Sampler, StopReason,
    Tokenizer, argmax,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn reference() -> Arc<ReferenceExecutor> {
    Arc::new(ReferenceExecutor::new(ByteTokenizer::VOCAB_SIZE).with_printable_bias())
}

fn collect(session: &GenerationSession, request: &GenerationRequest) -> (String, usize, Vec<u32>, StopReason) {
    let mut text = String::new();
    let mut pieces = 0;
    let outcome = session
        .generate(request, |p| {
            text.push_str(p);
            pieces += 1;
        })
        .unwrap();
    (text, pieces, outcome.generated, outcome.stats.stop_reason)
}

#[test]
fn decode_only_and_hybrid_produce_identical_tokens() {
    for strategy in [CacheStrategy::SmartMask, CacheStrategy::ShiftPointer] {
        let run = |mode| {
            let config = RunnerConfig {
                kv_updater: strategy,
                eval_mode: mode,
                context_len: 24,
                temperature: 0.7,
                seed: Some(5),
                ..Default::default()
            };
            let session = GenerationSession::new(reference(), Arc::new(ByteTokenizer), config).unwrap();
            collect(&session, &GenerationRequest::new("Once upon a time", 48))
        };
        let (hybrid_text, _, hybrid_tokens, hybrid_stop) = run(EvalMode::Hybrid);
        let (kv_text, _, kv_tokens, kv_stop) = run(EvalMode::DecodeOnly);
        assert_eq!(hybrid_tokens, kv_tokens, "strategy {:?}", strategy);
        assert_eq!(hybrid_text, kv_text);
        assert_eq!(hybrid_stop, kv_stop);
    }
}

#[test]
fn modes_agree_when_carried_window_slides() {
    // After the first turn every prompt starts with the window partly or
    // fully slid, so hybrid prefill cannot take it in one batch.
    let turns = [("ab", 4), ("wxyz", 12), ("abcd", 8), ("hey", 16)];
    let run = |mode| {
        let config = RunnerConfig {
            kv_updater: CacheStrategy::ShiftPointer,
            eval_mode: mode,
            context_len: 6,
            carry_context: true,
            seed: Some(1),
            ..Default::default()
        };
        let session = GenerationSession::new(reference(), Arc::new(ByteTokenizer), config).unwrap();
        let mut outputs = Vec::new();
        for (prompt, max) in turns {
            let tokens = session.generate(&GenerationRequest::new(prompt, max), |_| {}).unwrap().generated;
            outputs.push((tokens, session.cached_positions().unwrap()));
        }
        outputs
    };
    let hybrid = run(EvalMode::Hybrid);
    let decode_only = run(EvalMode::DecodeOnly);
    for (turn, (h, d)) in hybrid.iter().zip(&decode_only).enumerate() {
        assert_eq!(h.0, d.0, "tokens differ on turn {}", turn);
        assert_eq!(h.1, d.1, "cached positions differ on turn {}", turn);
    }
}

#[test]
fn callback_fires_once_per_token_and_reconstructs_text() {
    let session = GenerationSession::new(reference(), Arc::new(ByteTokenizer), RunnerConfig::default()).unwrap();
    let (text, pieces, tokens, _) = collect(&session, &GenerationRequest::new("The sky is", 40));
    assert_eq!(pieces, tokens.len());
    let decoded: String = tokens.iter().map(|&t| ByteTokenizer.decode(t).unwrap()).collect();
    assert_eq!(text, decoded);
}

#[test]
fn greedy_ignores_the_seed() {
    let run = |seed| {
        let config = RunnerConfig {
            seed: Some(seed),
            ..Default::default()
        };
        let session = GenerationSession::new(reference(), Arc::new(ByteTokenizer), config).unwrap();
        collect(&session, &GenerationRequest::new("abc", 30)).2
    };
    assert_eq!(run(1), run(999));
}

#[test]
fn greedy_tie_takes_lowest_index() {
    assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), 1);
}

#[test]
fn same_seed_reproduces_sampled_output() {
    let run = || {
        let config = RunnerConfig {
            temperature: 1.0,
            seed: Some(42),
            ..Default::default()
        };
        let session = GenerationSession::new(reference(), Arc::new(ByteTokenizer), config).unwrap();
        collect(&session, &GenerationRequest::new("seeded", 32)).2
    };
    assert_eq!(run(), run());
}

#[test]
fn smart_mask_stops_at_capacity() {
    let config = RunnerConfig {
        context_len: 4,
        add_bos: false,
        ..Default::default()
    };
    let session = GenerationSession::new(reference(), Arc::new(NoEosTokenizer), config).unwrap();
    let (_, pieces, tokens, stop) = collect(&session, &GenerationRequest::new("ab", 10));
    assert_eq!(tokens.len(), 2);
    assert_eq!(pieces, 2);
    assert_eq!(stop, StopReason::CacheCapacity);
}

#[test]
fn shift_pointer_keeps_most_recent_window() {
    let config = RunnerConfig {
        kv_updater: CacheStrategy::ShiftPointer,
        context_len: 3,
        add_bos: false,
        ..Default::default()
    };
    let session = GenerationSession::new(reference(), Arc::new(NoEosTokenizer), config).unwrap();
    // 2 prompt tokens + 4 fed-back tokens occupy positions 0..=5.
    let (_, _, tokens, stop) = collect(&session, &GenerationRequest::new("ab", 7));
    assert_eq!(tokens.len(), 5);
    assert_eq!(stop, StopReason::MaxLength);
    assert_eq!(session.cached_positions().unwrap(), vec![3, 4, 5]);
}

#[test]
fn shift_pointer_runs_past_capacity() {
    let config = RunnerConfig {
        kv_updater: CacheStrategy::ShiftPointer,
        context_len: 8,
        ..Default::default()
    };
    let session = GenerationSession::new(reference(), Arc::new(NoEosTokenizer), config).unwrap();
    let (_, _, tokens, stop) = collect(&session, &GenerationRequest::new("hi", 40));
    assert_eq!(tokens.len(), 40 - 3);
    assert_eq!(stop, StopReason::MaxLength);
    assert_eq!(session.cached_positions().unwrap().len(), 8);
}

#[test]
fn end_of_sequence_is_not_streamed() {
    let executor = Arc::new(ScriptExecutor::new(&[b'h' as u32, b'i' as u32, ByteTokenizer::EOS]));
    let session = GenerationSession::new(executor, Arc::new(ByteTokenizer), RunnerConfig::default()).unwrap();
    let (text, pieces, tokens, stop) = collect(&session, &GenerationRequest::new("x", 20));
    assert_eq!(text, "hi");
    assert_eq!(pieces, 2);
    assert_eq!(tokens, vec![b'h' as u32, b'i' as u32]);
    assert_eq!(stop, StopReason::EndOfSequence);
}

#[test]
fn postprocessor_dequantizes() {
    let post = LogitPostprocessor::new(2, LogitsQuant::new(2.0, 10));
    assert_eq!(post.apply(&RawLogits::U16(vec![10, 12])).unwrap(), vec![0.0, 4.0]);

    let identity = LogitPostprocessor::new(3, LogitsQuant::new(0.0, 7));
    assert_eq!(identity.apply(&RawLogits::F32(vec![1.5, -2.0, 0.0])).unwrap(), vec![1.5, -2.0, 0.0]);
}

#[test]
fn empty_distribution_is_an_error() {
    let mut rng = StdRng::seed_from_u64(0);
    for temperature in [0.0, 0.9] {
        let err = Sampler::new(temperature).sample(&[], &mut rng).unwrap_err();
        assert!(matches!(err, GenerateError::EmptyDistribution));
    }
}

#[test]
fn quantized_executor_output_is_dequantized() {
    let quant = LogitsQuant::new(0.01, 32768);
    let executor = Arc::new(
        ReferenceExecutor::new(ByteTokenizer::VOCAB_SIZE)
            .with_printable_bias()
            .with_quantized_output(quant),
    );
    let config = RunnerConfig {
        logits_scale: quant.scale,
        logits_offset: quant.offset,
        ..Default::default()
    };
    let session = GenerationSession::new(executor, Arc::new(ByteTokenizer), config).unwrap();
    let (text, pieces, tokens, _) = collect(&session, &GenerationRequest::new("quant", 24));
    assert_eq!(pieces, tokens.len());
    let decoded: String = tokens.iter().map(|&t| ByteTokenizer.decode(t).unwrap()).collect();
    assert_eq!(text, decoded);
}

#[test]
fn executor_failure_invalidates_until_reset() {
    let session =
        GenerationSession::new(Arc::new(FlakyExecutor::new(2)), Arc::new(NoEosTokenizer), RunnerConfig::default())
            .unwrap();
    let mut streamed = 0;
    let err = session
        .generate(&GenerationRequest::new("abc", 30), |_| streamed += 1)
        .unwrap_err();
    assert!(matches!(err, GenerateError::ExecutorFailure(_)));
    // Prefill succeeded, then two decode steps; the second failed.
    assert_eq!(streamed, 2);
    assert!(session.cached_positions().unwrap().is_empty());

    let err = session.generate(&GenerationRequest::new("abc", 30), |_| {}).unwrap_err();
    assert!(matches!(err, GenerateError::CacheInvalid));

    session.reset().unwrap();
    assert!(session.generate(&GenerationRequest::new("abc", 30), |_| {}).is_ok());
}

#[test]
fn panicking_callback_invalidates_session() {
    let session = GenerationSession::new(reference(), Arc::new(NoEosTokenizer), RunnerConfig::default()).unwrap();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = session.generate(&GenerationRequest::new("boom", 16), |_| panic!("callback failed"));
    }));
    assert!(result.is_err());
    assert!(session.is_invalid().unwrap());
    session.reset().unwrap();
    assert!(session.generate(&GenerationRequest::new("boom", 16), |_| {}).is_ok());
}

#[test]
fn cancel_stops_after_current_step() {
    let session = GenerationSession::new(reference(), Arc::new(NoEosTokenizer), RunnerConfig::default()).unwrap();
    let cancel = session.cancel_handle();
    let mut pieces = 0;
    let outcome = session
        .generate(&GenerationRequest::new("stop", 64), |_| {
            pieces += 1;
            if pieces == 3 {
                cancel.store(true, Ordering::Release);
            }
        })
        .unwrap();
    assert_eq!(outcome.generated.len(), 3);
    assert_eq!(outcome.stats.stop_reason, StopReason::Cancelled);

    // The flag is cleared for the next generation.
    let outcome = session.generate(&GenerationRequest::new("stop", 12), |_| {}).unwrap();
    assert_eq!(outcome.stats.stop_reason, StopReason::MaxLength);
}

#[test]
fn init_rejects_invalid_requests() {
    let session = GenerationSession::new(
        reference(),
        Arc::new(ByteTokenizer),
        RunnerConfig {
            context_len: 8,
            add_bos: false,
            ..Default::default()
        },
    )
    .unwrap();
    for request in [
        GenerationRequest::new("", 8),
        GenerationRequest::new("abc", 0),
        GenerationRequest::new("abc", 3),
        GenerationRequest::new("abcdefgh", 20),
    ] {
        let err = session.generate(&request, |_| panic!("nothing should stream")).unwrap_err();
        assert!(matches!(err, GenerateError::Configuration(_)), "{:?}", request);
    }
}

#[test]
fn system_prompt_counts_toward_prompt_tokens() {
    let session = GenerationSession::new(reference(), Arc::new(ByteTokenizer), RunnerConfig::default()).unwrap();
    let request = GenerationRequest::new("Hi", 40).with_system_prompt("Be brief.");
    let outcome = session.generate(&request, |_| {}).unwrap();
    // BOS + "Be brief.\nHi"
    assert_eq!(outcome.stats.prompt_tokens, 1 + "Be brief.\nHi".len());
}
