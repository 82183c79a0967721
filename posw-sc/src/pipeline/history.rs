//! Bounded, most-recent-first scan history

use posw_common::scan::ScanResult;
use std::collections::VecDeque;

/// Number of results kept per session
pub const HISTORY_CAPACITY: usize = 50;

/// Most-recent-first log of scan results
///
/// Oldest entries are evicted once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct ScanHistory {
    entries: VecDeque<ScanResult>,
    capacity: usize,
}

impl ScanHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a result as the most recent entry
    pub fn push(&mut self, result: ScanResult) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front(result);
        self.entries.truncate(self.capacity);
    }

    /// Most recent result
    pub fn latest(&self) -> Option<&ScanResult> {
        self.entries.front()
    }

    /// Iterate from newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &ScanResult> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<ScanResult> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ScanHistory {
    fn default() -> Self {
        Self::new()
    }
}
