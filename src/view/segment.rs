//! Capacity-bounded slice of the merged key stream.

use std::cmp::Ordering;
use std::fmt;

use crate::cursor::{BoxCursor, Cursor, CursorError, RunId};
use crate::keys::{Comparator, HexKey};
use crate::provider::RunProvider;

use super::ViewError;

/// One key of the merged stream and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Key as produced by the merge cursor.
    pub key: Vec<u8>,

    /// Provenance tag: the run that produced `key`.
    pub run: RunId,

    /// Ordinal of this row among the segment's rows from `run`.
    pub step: usize,
}

/// Outcome of [`Segment::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentInsert {
    Inserted,
    /// Segment is at capacity; nothing was changed.
    Full,
}

/// Ordered rows plus one cached reference cursor per run present.
///
/// The reference cursor for run `r` sits on the first row of `r` in this
/// segment. A row `(key, r, step)` is reached by seeking a fresh cursor on
/// run `r` to the reference key and advancing it `step` times.
pub struct Segment {
    rows: Vec<Row>,

    /// Rows per run id.
    run_counts: Vec<usize>,

    /// Reference cursor per run id, created when the run first appears.
    cursors: Vec<Option<BoxCursor>>,

    capacity: usize,
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("len", &self.rows.len())
            .field("capacity", &self.capacity)
            .field("cached_cursors", &self.cached_cursors())
            .finish()
    }
}

impl Segment {
    pub(crate) fn new(capacity: usize, runs_num: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            run_counts: vec![0; runs_num],
            cursors: (0..runs_num).map(|_| None).collect(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&Row> {
        self.rows.get(idx)
    }

    pub fn first_key(&self) -> Option<&[u8]> {
        self.rows.first().map(|r| r.key.as_slice())
    }

    pub fn last_key(&self) -> Option<&[u8]> {
        self.rows.last().map(|r| r.key.as_slice())
    }

    /// Number of rows from `run`.
    pub fn run_count(&self, run: RunId) -> usize {
        self.run_counts.get(run).copied().unwrap_or(0)
    }

    /// Number of reference cursors currently cached.
    pub fn cached_cursors(&self) -> usize {
        self.cursors.iter().filter(|c| c.is_some()).count()
    }

    /// Key under the cached reference cursor for `run`.
    pub fn reference_key(&self, run: RunId) -> Option<&[u8]> {
        self.cursors
            .get(run)?
            .as_ref()
            .filter(|c| c.valid())
            .map(|c| c.key())
    }

    /// Index of the first row with key `>= target`.
    pub(crate) fn lower_bound(&self, comparator: &dyn Comparator, target: &[u8]) -> usize {
        self.rows
            .partition_point(|r| comparator.compare(&r.key, target) == Ordering::Less)
    }

    /// Index of the first row with key `> target`.
    pub(crate) fn upper_bound(&self, comparator: &dyn Comparator, target: &[u8]) -> usize {
        self.rows
            .partition_point(|r| comparator.compare(&r.key, target) != Ordering::Greater)
    }

    /// Inserts `key` from `run` after every row that sorts at or below it.
    ///
    /// Returns [`SegmentInsert::Full`] without side effects when the segment
    /// is at capacity. On error the segment is unchanged.
    pub(crate) fn insert<P: RunProvider + ?Sized>(
        &mut self,
        provider: &P,
        comparator: &dyn Comparator,
        key: &[u8],
        run: RunId,
    ) -> Result<SegmentInsert, ViewError> {
        // Equal keys from other runs go after the rows already holding them.
        let pos = match self.rows.last() {
            Some(last) if comparator.compare(&last.key, key) == Ordering::Greater => {
                self.upper_bound(comparator, key)
            }
            _ => self.rows.len(),
        };

        if self.is_full() {
            return Ok(SegmentInsert::Full);
        }

        let step = if pos == self.rows.len() {
            self.run_counts[run]
        } else {
            self.rows[..pos].iter().filter(|r| r.run == run).count()
        };

        // The new row becomes the run's first one here; move the reference.
        let reference = if step == 0 {
            Some(open_reference(provider, comparator, run, key)?)
        } else {
            None
        };

        for row in self.rows[pos..].iter_mut().filter(|r| r.run == run) {
            row.step += 1;
        }
        self.rows.insert(
            pos,
            Row {
                key: key.to_vec(),
                run,
                step,
            },
        );
        self.run_counts[run] += 1;
        if reference.is_some() {
            self.cursors[run] = reference;
        }

        Ok(SegmentInsert::Inserted)
    }

    /// Removes and returns rows `at..`, dropping reference cursors of runs
    /// that no longer appear.
    pub(crate) fn split_off(&mut self, at: usize) -> Vec<Row> {
        let tail = self.rows.split_off(at);
        for row in &tail {
            self.run_counts[row.run] -= 1;
            if self.run_counts[row.run] == 0 {
                self.cursors[row.run] = None;
            }
        }
        tail
    }
}

/// Opens a cursor on `run` positioned exactly at `key`.
fn open_reference<P: RunProvider + ?Sized>(
    provider: &P,
    comparator: &dyn Comparator,
    run: RunId,
    key: &[u8],
) -> Result<BoxCursor, ViewError> {
    let mut cursor = provider.new_run_cursor(run)?;
    cursor.seek(key);
    cursor.status()?;

    if !cursor.valid() || comparator.compare(cursor.key(), key) != Ordering::Equal {
        return Err(CursorError::Corruption(format!(
            "run {run} has no entry for key {}",
            HexKey(key)
        ))
        .into());
    }
    Ok(cursor)
}
