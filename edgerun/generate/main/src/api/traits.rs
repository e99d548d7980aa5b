//! Cache capability traits

use crate::api::error::GenerateResult;
use crate::api::types::CacheStrategy;

/// One readable cache position, borrowed from the cache buffers.
#[derive(Debug, Clone, Copy)]
pub struct CacheEntryRef<'a> {
    pub position: usize,
    pub key: &'a [f32],
    pub value: &'a [f32],
}

/// Ordered (oldest first) view of the valid entries of a cache.
#[derive(Debug, Clone, Default)]
pub struct CacheView<'a> {
    entries: Vec<CacheEntryRef<'a>>,
}

impl<'a> CacheView<'a> {
    pub fn new(entries: Vec<CacheEntryRef<'a>>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntryRef<'a>> {
        self.entries.iter()
    }

    pub fn positions(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.position).collect()
    }
}

/// KV cache capability shared by both update strategies.
///
/// Positions are appended in strictly increasing order starting from
/// `next_position()`; the strategy is fixed at construction.
pub trait KvCache: Send {
    /// Update strategy this cache was built with.
    fn strategy(&self) -> CacheStrategy;

    /// Number of slots.
    fn capacity(&self) -> usize;

    /// Number of positions currently readable.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position the next `append` must use.
    fn next_position(&self) -> usize;

    /// Store the key/value vectors of `position`.
    fn append(&mut self, position: usize, key: &[f32], value: &[f32]) -> GenerateResult<()>;

    /// Valid entries with `position < end`, oldest first.
    fn read(&self, end: usize) -> CacheView<'_>;

    /// Drop every entry and restart positions at zero.
    fn reset(&mut self);
}
