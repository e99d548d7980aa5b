use crate::api::error::GenerateResult;
use crate::api::traits::{CacheEntryRef, CacheView, KvCache};
use crate::api::types::{CacheLayout, CacheStrategy};

/// Ring-buffer cache: once every slot is used, each append overwrites the
/// oldest position. Only the most recent `capacity` positions are readable.
pub struct ShiftPointerCache {
    keys: Vec<f32>,
    values: Vec<f32>,
    capacity: usize,
    width: usize,
    /// Slot the next append writes to
    cursor: usize,
    len: usize,
    next_position: usize,
}

impl ShiftPointerCache {
    pub fn new(capacity: usize, layout: CacheLayout) -> Self {
        let width = layout.entry_width();
        Self {
            keys: vec![0.0; capacity * width],
            values: vec![0.0; capacity * width],
            capacity,
            width,
            cursor: 0,
            len: 0,
            next_position: 0,
        }
    }

    /// Oldest position still stored.
    pub fn oldest_position(&self) -> usize {
        self.next_position - self.len
    }

    /// Number of positions dropped since the last reset.
    pub fn evicted(&self) -> usize {
        self.oldest_position()
    }

    fn slot_of(&self, position: usize) -> usize {
        let age = self.next_position - position;
        (self.cursor + self.capacity - age) % self.capacity
    }
}

impl KvCache for ShiftPointerCache {
    fn strategy(&self) -> CacheStrategy {
        CacheStrategy::ShiftPointer
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.len
    }

    fn next_position(&self) -> usize {
        self.next_position
    }

    fn append(&mut self, position: usize, key: &[f32], value: &[f32]) -> GenerateResult<()> {
        super::check_entry(self.next_position, position, self.width, key, value)?;
        if self.len == self.capacity {
            log::trace!("kv cache: evicting position {}", self.oldest_position());
        }
        let start = self.cursor * self.width;
        self.keys[start..start + self.width].copy_from_slice(key);
        self.values[start..start + self.width].copy_from_slice(value);
        self.cursor = (self.cursor + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
        self.next_position += 1;
        Ok(())
    }

    fn read(&self, end: usize) -> CacheView<'_> {
        let end = end.min(self.next_position);
        let entries = (self.oldest_position()..end)
            .map(|position| {
                let start = self.slot_of(position) * self.width;
                CacheEntryRef {
                    position,
                    key: &self.keys[start..start + self.width],
                    value: &self.values[start..start + self.width],
                }
            })
            .collect();
        CacheView::new(entries)
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.len = 0;
        self.next_position = 0;
    }
}
