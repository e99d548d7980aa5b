use crate::api::error::{GenerateError, GenerateResult};
use crate::api::traits::{CacheEntryRef, CacheView, KvCache};
use crate::api::types::{CacheLayout, CacheStrategy};

/// Fixed-slot cache: position `p` lives in slot `p`, and a validity mask
/// hides slots that have not been written yet.
pub struct SmartMaskCache {
    keys: Vec<f32>,
    values: Vec<f32>,
    valid: Vec<bool>,
    capacity: usize,
    width: usize,
    len: usize,
}

impl SmartMaskCache {
    pub fn new(capacity: usize, layout: CacheLayout) -> Self {
        let width = layout.entry_width();
        Self {
            keys: vec![0.0; capacity * width],
            values: vec![0.0; capacity * width],
            valid: vec![false; capacity],
            capacity,
            width,
            len: 0,
        }
    }

    /// Slot validity mask over the whole buffer.
    pub fn mask(&self) -> &[bool] {
        &self.valid
    }

    fn slot(&self, slot: usize) -> CacheEntryRef<'_> {
        let start = slot * self.width;
        CacheEntryRef {
            position: slot,
            key: &self.keys[start..start + self.width],
            value: &self.values[start..start + self.width],
        }
    }
}

impl KvCache for SmartMaskCache {
    fn strategy(&self) -> CacheStrategy {
        CacheStrategy::SmartMask
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.len
    }

    fn next_position(&self) -> usize {
        self.len
    }

    fn append(&mut self, position: usize, key: &[f32], value: &[f32]) -> GenerateResult<()> {
        if position >= self.capacity {
            return Err(GenerateError::CacheFull {
                capacity: self.capacity,
            });
        }
        super::check_entry(self.len, position, self.width, key, value)?;
        let start = position * self.width;
        self.keys[start..start + self.width].copy_from_slice(key);
        self.values[start..start + self.width].copy_from_slice(value);
        self.valid[position] = true;
        self.len += 1;
        Ok(())
    }

    fn read(&self, end: usize) -> CacheView<'_> {
        let end = end.min(self.capacity);
        let entries = (0..end)
            .filter(|&slot| self.valid[slot])
            .map(|slot| self.slot(slot))
            .collect();
        CacheView::new(entries)
    }

    fn reset(&mut self) {
        self.valid.iter_mut().for_each(|v| *v = false);
        self.len = 0;
    }
}
