//! Cursor resolved through the anchor index.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::cursor::{BoxCursor, Cursor, CursorError, RunId};
use crate::provider::RunProvider;

use super::AnchorIndex;

/// Location of the current row, as reported by [`ViewIterator::position`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewPosition {
    pub segment: usize,
    pub row: usize,
    /// Provenance tag of the row.
    pub run: RunId,
    /// Ordinal of the row among its segment's rows from `run`.
    pub step: usize,
}

/// Ordered cursor over a built [`AnchorIndex`].
///
/// Positioning goes through a binary search over the anchors and then over
/// one segment; the entry itself is read from a single-run cursor rebuilt
/// from the segment's reference key. Moving to a row from the same run
/// reuses that cursor, moving to another run rebuilds one.
///
/// An iterator is owned by one thread at a time; any number of iterators
/// may share the same index.
pub struct ViewIterator<P: RunProvider> {
    index: Arc<AnchorIndex<P>>,

    /// `(segment, row)` of the current entry.
    position: Option<(usize, usize)>,

    /// Single-run cursor sitting on the current entry.
    current: Option<BoxCursor>,

    status: Result<(), CursorError>,
    materializations: usize,
}

impl<P: RunProvider> fmt::Debug for ViewIterator<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewIterator")
            .field("position", &self.position())
            .field("status", &self.status)
            .field("materializations", &self.materializations)
            .finish()
    }
}

impl<P: RunProvider> ViewIterator<P> {
    /// Creates an unpositioned iterator.
    pub fn new(index: Arc<AnchorIndex<P>>) -> Self {
        Self {
            index,
            position: None,
            current: None,
            status: Ok(()),
            materializations: 0,
        }
    }

    pub fn index(&self) -> &Arc<AnchorIndex<P>> {
        &self.index
    }

    /// Segment, row, run and step of the current entry.
    pub fn position(&self) -> Option<ViewPosition> {
        let (segment, row) = self.position?;
        let r = self.index.segment(segment)?.row(row)?;
        Some(ViewPosition {
            segment,
            row,
            run: r.run,
            step: r.step,
        })
    }

    /// Number of single-run cursors rebuilt so far.
    pub fn materializations(&self) -> usize {
        self.materializations
    }

    fn run_at(&self, seg: usize, row: usize) -> RunId {
        self.index.segments()[seg].rows()[row].run
    }

    fn invalidate(&mut self) {
        self.position = None;
        self.current = None;
    }

    fn fail(&mut self, err: CursorError) {
        warn!(error = %err, "view iterator failed");
        self.invalidate();
        self.status = Err(err);
    }

    /// Rebuilds the cursor for `pos`, or goes invalid when `pos` is `None`.
    fn position_at(&mut self, pos: Option<(usize, usize)>) {
        self.status = Ok(());
        self.current = None;

        let Some((seg, row)) = pos else {
            self.position = None;
            return;
        };

        self.materializations += 1;
        match self.index.materialize(seg, row) {
            Ok(cursor) => {
                self.current = Some(cursor);
                self.position = Some((seg, row));
            }
            Err(err) => self.fail(err),
        }
    }

    /// Moves to `pos`, stepping the current cursor when the row comes from
    /// the same run and rebuilding it otherwise.
    fn step_to(&mut self, from: (usize, usize), pos: Option<(usize, usize)>, forward: bool) {
        let Some((seg, row)) = pos else {
            trace!(forward, "view iterator exhausted");
            self.invalidate();
            return;
        };

        if self.run_at(from.0, from.1) != self.run_at(seg, row) {
            self.position_at(pos);
            return;
        }

        let Some(cursor) = self.current.as_mut() else {
            self.fail(CursorError::Internal("positioned without a cursor".into()));
            return;
        };
        if forward {
            cursor.next();
        } else {
            cursor.prev();
        }

        if let Err(err) = cursor.status() {
            self.fail(err);
            return;
        }
        let expected = &self.index.segments()[seg].rows()[row].key;
        let in_step = cursor.valid()
            && self.index.comparator().compare(cursor.key(), expected) == Ordering::Equal;
        if !in_step {
            let run = self.run_at(seg, row);
            self.fail(CursorError::Corruption(format!(
                "run {run} diverged from snapshot at segment {seg} row {row}"
            )));
            return;
        }
        self.position = Some((seg, row));
    }

    fn current(&self) -> &BoxCursor {
        assert!(self.valid(), "ViewIterator is not positioned");
        match &self.current {
            Some(cursor) => cursor,
            None => unreachable!("valid iterator always holds a cursor"),
        }
    }
}

impl<P: RunProvider> Cursor for ViewIterator<P> {
    fn valid(&self) -> bool {
        self.position.is_some() && self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        let pos = self.index.first_position();
        self.position_at(pos);
    }

    fn seek_to_last(&mut self) {
        let pos = self.index.last_position();
        self.position_at(pos);
    }

    fn seek(&mut self, target: &[u8]) {
        let pos = self.index.locate(target);
        self.position_at(pos);
    }

    fn next(&mut self) {
        assert!(self.valid(), "next() on invalid ViewIterator");
        let Some((seg, row)) = self.position else {
            return;
        };
        let succ = self.index.successor(seg, row);
        self.step_to((seg, row), succ, true);
    }

    fn prev(&mut self) {
        assert!(self.valid(), "prev() on invalid ViewIterator");
        let Some((seg, row)) = self.position else {
            return;
        };
        let pred = self.index.predecessor(seg, row);
        self.step_to((seg, row), pred, false);
    }

    fn key(&self) -> &[u8] {
        self.current().key()
    }

    fn value(&self) -> &[u8] {
        self.current().value()
    }

    fn status(&self) -> Result<(), CursorError> {
        self.status.clone()
    }
}
