//! KV cache storage with two update strategies.
//!
//! Both strategies pre-allocate `capacity * entry_width` keys and values and
//! never move data on append; they differ only in what happens once every
//! slot has been written.

mod shift_pointer;
mod smart_mask;

pub use shift_pointer::ShiftPointerCache;
pub use smart_mask::SmartMaskCache;

use crate::api::error::{GenerateError, GenerateResult};
use crate::api::traits::KvCache;
use crate::api::types::{CacheLayout, CacheStrategy};

/// Build the cache for `strategy`. The choice cannot be changed afterwards.
pub fn new_kv_cache(
    strategy: CacheStrategy,
    capacity: usize,
    layout: CacheLayout,
) -> GenerateResult<Box<dyn KvCache>> {
    if capacity == 0 {
        return Err(GenerateError::Configuration("cache capacity must be > 0".into()));
    }
    if layout.entry_width() == 0 {
        return Err(GenerateError::Configuration(format!(
            "cache layout must be non-empty, got {:?}",
            layout
        )));
    }
    let cache: Box<dyn KvCache> = match strategy {
        CacheStrategy::SmartMask => Box::new(SmartMaskCache::new(capacity, layout)),
        CacheStrategy::ShiftPointer => Box::new(ShiftPointerCache::new(capacity, layout)),
    };
    log::debug!(
        "kv cache: {} capacity={} width={} ({:.1} KB)",
        strategy.name(),
        capacity,
        layout.entry_width(),
        (2 * capacity * layout.entry_width() * 4) as f64 / 1024.0
    );
    Ok(cache)
}

/// Shared append precondition: positions are dense and vectors match the layout.
fn check_entry(
    expected_position: usize,
    position: usize,
    width: usize,
    key: &[f32],
    value: &[f32],
) -> GenerateResult<()> {
    if position != expected_position {
        return Err(GenerateError::InvalidCacheEntry(format!(
            "expected position {}, got {}",
            expected_position, position
        )));
    }
    if key.len() != width || value.len() != width {
        return Err(GenerateError::InvalidCacheEntry(format!(
            "entry width mismatch: expected {}, got key={} value={}",
            width,
            key.len(),
            value.len()
        )));
    }
    Ok(())
}
