pub mod batch;
pub mod executor;
pub mod kv_cache;
pub mod logits;
pub mod orchestrator;
pub mod prompt;
pub mod reference;
pub mod sampling;
pub mod session;
