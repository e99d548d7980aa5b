//! Facade re-exports for edgerun-generate

pub use crate::api::error::*;
pub use crate::api::traits::{CacheEntryRef, CacheView, KvCache};
pub use crate::api::types::*;
pub use crate::core::batch::{BatchOutput, generate_batch, generate_batch_parallel};
pub use crate::core::executor::ExecutorAdapter;
pub use crate::core::kv_cache::{ShiftPointerCache, SmartMaskCache, new_kv_cache};
pub use crate::core::logits::LogitPostprocessor;
pub use crate::core::orchestrator::{DecodeOrchestrator, DecodeOutcome};
pub use crate::core::prompt::{encode_prompt, format_prompt};
pub use crate::core::reference::{ByteTokenizer, ReferenceExecutor};
pub use crate::core::sampling::{Sampler, argmax, sample_categorical, softmax_with_temperature};
pub use crate::core::session::GenerationSession;
pub use crate::spi::contract::{ExecutorInput, ExecutorOutput, KvWrite, ModelExecutor, RawLogits, Tokenizer};
