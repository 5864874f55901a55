//! Immutable sorted runs and their native cursors.
//!
//! A [`Run`] is one ascending sequence of `(key, value)` pairs contributed
//! by the store: the active write buffer snapshot, an immutable write
//! buffer, or a level file. Runs are validated once on construction and
//! never mutated afterwards, so they are shared behind `Arc` and any
//! number of [`RunCursor`]s can walk the same run concurrently.
//!
//! # Seeking
//!
//! Entries live in one contiguous vector, so `seek` is a binary search
//! (`partition_point`) under the run's comparator. `next`/`prev` are index
//! moves.


use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::cursor::{Cursor, CursorError, KeyValue};
use crate::keys::Comparator;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned while constructing a [`Run`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    /// Entry at `index` is not strictly greater than its predecessor.
    #[error("Run entries not strictly ascending at index {index}")]
    Unsorted { index: usize },
}

// ------------------------------------------------------------------------------------------------
// Run
// ------------------------------------------------------------------------------------------------

/// An immutable, strictly ascending sequence of key-value pairs.
pub struct Run {
    /// Entries in ascending key order.
    entries: Vec<KeyValue>,

    /// Order the entries were validated against.
    comparator: Arc<dyn Comparator>,

    /// Sum of key and value lengths.
    approximate_size: usize,
}

impl fmt::Debug for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("len", &self.entries.len())
            .field("approximate_size", &self.approximate_size)
            .field("comparator", &self.comparator.name())
            .finish()
    }
}

impl Run {
    /// Creates a run from entries that must already be strictly ascending
    /// under `comparator`.
    pub fn new(entries: Vec<KeyValue>, comparator: Arc<dyn Comparator>) -> Result<Self, RunError> {
        for (index, pair) in entries.windows(2).enumerate() {
            if comparator.compare(&pair[0].0, &pair[1].0) != Ordering::Less {
                return Err(RunError::Unsorted { index: index + 1 });
            }
        }

        let approximate_size = entries.iter().map(|(k, v)| k.len() + v.len()).sum();

        Ok(Self {
            entries,
            comparator,
            approximate_size,
        })
    }

    /// Sorts `entries` by key and builds a run. Duplicate keys are rejected.
    pub fn from_unsorted(
        mut entries: Vec<KeyValue>,
        comparator: Arc<dyn Comparator>,
    ) -> Result<Self, RunError> {
        entries.sort_by(|a, b| comparator.compare(&a.0, &b.0));
        Self::new(entries, comparator)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_key(&self) -> Option<&[u8]> {
        self.entries.first().map(|(k, _)| k.as_slice())
    }

    pub fn last_key(&self) -> Option<&[u8]> {
        self.entries.last().map(|(k, _)| k.as_slice())
    }

    pub fn approximate_size(&self) -> usize {
        self.approximate_size
    }

    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.comparator
    }

    /// Opens an unpositioned cursor over this run.
    pub fn cursor(self: &Arc<Self>) -> RunCursor {
        RunCursor::new(Arc::clone(self))
    }

    /// Index of the first entry with key `>= target`.
    fn lower_bound(&self, target: &[u8]) -> usize {
        self.entries
            .partition_point(|(k, _)| self.comparator.compare(k, target) == Ordering::Less)
    }
}

// ------------------------------------------------------------------------------------------------
// Run cursor
// ------------------------------------------------------------------------------------------------

/// Native cursor over a single [`Run`].
///
/// Holds its own `Arc` on the run, so it outlives whoever created it.
pub struct RunCursor {
    run: Arc<Run>,

    /// Current entry index; `None` when unpositioned or exhausted.
    pos: Option<usize>,
}

impl RunCursor {
    pub fn new(run: Arc<Run>) -> Self {
        Self { run, pos: None }
    }

    /// Index of the current entry within the run.
    pub fn position(&self) -> Option<usize> {
        self.pos
    }

    fn entry(&self) -> &KeyValue {
        let idx = self.pos.expect("RunCursor is not positioned");
        &self.run.entries[idx]
    }
}

impl Cursor for RunCursor {
    fn valid(&self) -> bool {
        self.pos.is_some()
    }

    fn seek_to_first(&mut self) {
        self.pos = if self.run.is_empty() { None } else { Some(0) };
    }

    fn seek_to_last(&mut self) {
        self.pos = self.run.len().checked_sub(1);
    }

    fn seek(&mut self, target: &[u8]) {
        let idx = self.run.lower_bound(target);
        self.pos = (idx < self.run.len()).then_some(idx);
    }

    fn next(&mut self) {
        assert!(self.valid(), "next() on invalid RunCursor");
        self.pos = self
            .pos
            .map(|idx| idx + 1)
            .filter(|&idx| idx < self.run.len());
    }

    fn prev(&mut self) {
        assert!(self.valid(), "prev() on invalid RunCursor");
        self.pos = self.pos.and_then(|idx| idx.checked_sub(1));
    }

    fn key(&self) -> &[u8] {
        &self.entry().0
    }

    fn value(&self) -> &[u8] {
        &self.entry().1
    }

    fn status(&self) -> Result<(), CursorError> {
        Ok(())
    }
}
