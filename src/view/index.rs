//! Anchor index: the ordered array of segments and their anchor keys.

use std::cmp::Ordering;
use std::fmt;
use std::iter;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::ViewConfig;
use crate::cursor::{BoxCursor, Cursor, CursorError, RunId};
use crate::keys::{Comparator, HexKey};
use crate::provider::RunProvider;

use super::segment::{Row, Segment, SegmentInsert};
use super::{ViewError, ViewIterator};

/// Snapshot of index layout statistics returned by [`AnchorIndex::stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    /// Segments in use.
    pub segments: usize,
    /// Rows across all segments.
    pub rows: usize,
    /// Allocated segment slots.
    pub max_segment_size: usize,
    /// Row capacity of each segment.
    pub key_num_perseg: usize,
    /// Runs of the provider the index was built from.
    pub runs_num: usize,
    /// Reference cursors held across all segments.
    pub cached_cursors: usize,
    /// `rows / (segments * key_num_perseg)`; `0.0` when empty.
    pub fill_ratio: f64,
}

/// Partition of a provider's merged key stream into anchored segments.
///
/// Built once by [`AnchorIndex::build`], then read-only. Wrap in `Arc` and
/// call [`AnchorIndex::new_iterator`] to query it.
pub struct AnchorIndex<P: RunProvider> {
    provider: Arc<P>,
    comparator: Arc<dyn Comparator>,

    /// First key of each segment; non-decreasing. Two anchors are equal only
    /// when rows with that key from several runs overflow a segment.
    anchors: Vec<Vec<u8>>,
    segments: Vec<Segment>,

    /// Allocated segment slots; grows by `config.segment_growth`.
    max_segment_size: usize,

    rows: usize,
    runs_num: usize,
    config: ViewConfig,
}

impl<P: RunProvider> fmt::Debug for AnchorIndex<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnchorIndex")
            .field("segments", &self.segments.len())
            .field("rows", &self.rows)
            .field("max_segment_size", &self.max_segment_size)
            .field("runs_num", &self.runs_num)
            .finish_non_exhaustive()
    }
}

impl<P: RunProvider> AnchorIndex<P> {
    // --------------------------------------------------------------------------------------------
    // Construction
    // --------------------------------------------------------------------------------------------

    /// Creates an empty index over `provider`.
    pub fn new(provider: Arc<P>, config: ViewConfig) -> Result<Self, ViewError> {
        config.validate()?;

        let initial = config.initial_segments;
        Ok(Self {
            comparator: provider.comparator(),
            runs_num: provider.runs_num(),
            provider,
            anchors: Vec::with_capacity(initial),
            segments: Vec::with_capacity(initial),
            max_segment_size: initial,
            rows: 0,
            config,
        })
    }

    /// Builds the index from one ascending pass of the provider's merge
    /// cursor.
    ///
    /// Any error reported by the provider aborts the build; no partial
    /// index is returned.
    pub fn build(provider: Arc<P>, config: ViewConfig) -> Result<Self, ViewError> {
        let started = Instant::now();
        let mut index = Self::new(provider, config)?;

        let mut merge = index.provider.merge_cursor()?;
        if merge.runs_num() != index.runs_num {
            return Err(ViewError::Internal(format!(
                "merge cursor spans {} runs, provider reports {}",
                merge.runs_num(),
                index.runs_num
            )));
        }

        merge.seek_to_first();
        while merge.valid() {
            index.insert(merge.key(), merge.provenance_tag())?;
            merge.next();
        }
        merge.status()?;

        info!(
            segments = index.segments.len(),
            rows = index.rows,
            runs = index.runs_num,
            key_num_perseg = index.config.key_num_perseg,
            elapsed_us = started.elapsed().as_micros() as u64,
            "sorted view built"
        );
        Ok(index)
    }

    /// Inserts `key` produced by run `run`.
    ///
    /// Keys normally arrive in ascending order and land at the tail of the
    /// last segment. Out-of-order keys are placed at their sorted position:
    /// a key below every anchor opens a new leftmost segment, and a key that
    /// falls into a full segment opens a new segment right after it, taking
    /// the full segment's greater rows along.
    ///
    /// A key already present from another run is placed after the rows
    /// holding it, keeping the merge order of equal keys. The same key from
    /// the same run is rejected with [`ViewError::DuplicateKey`].
    pub fn insert(&mut self, key: &[u8], run: RunId) -> Result<(), ViewError> {
        if run >= self.runs_num {
            return Err(ViewError::RunOutOfRange {
                run,
                runs_num: self.runs_num,
            });
        }
        trace!(key = %HexKey(key), run, "insert");

        // Ascending build pass: append to the tail segment.
        let appends = self
            .segments
            .last()
            .and_then(Segment::last_key)
            .is_some_and(|k| self.comparator.compare(k, key) == Ordering::Less);
        if appends {
            return self.insert_into(self.segments.len() - 1, key, run);
        }

        if self.segments.is_empty() {
            return self.open_segment(0, key, run, &[]);
        }

        if self.holds(key, run) {
            return Err(ViewError::DuplicateKey(key.to_vec()));
        }

        let upper = self
            .anchors
            .partition_point(|a| self.comparator.compare(a, key) != Ordering::Greater);
        if upper == 0 {
            // New leftmost boundary.
            return self.open_segment(0, key, run, &[]);
        }

        self.insert_into(upper - 1, key, run)
    }

    /// Whether `run` already contributed a row equal to `key`.
    fn holds(&self, key: &[u8], run: RunId) -> bool {
        let mut pos = self.locate(key);
        while let Some((seg, row)) = pos {
            let r = &self.segments[seg].rows()[row];
            if self.comparator.compare(&r.key, key) != Ordering::Equal {
                return false;
            }
            if r.run == run {
                return true;
            }
            pos = self.successor(seg, row);
        }
        false
    }

    fn insert_into(&mut self, seg: usize, key: &[u8], run: RunId) -> Result<(), ViewError> {
        let provider = &*self.provider;
        let comparator = &*self.comparator;

        match self.segments[seg].insert(provider, comparator, key, run)? {
            SegmentInsert::Inserted => {
                self.rows += 1;
                Ok(())
            }
            SegmentInsert::Full => {
                let at = self.segments[seg].upper_bound(comparator, key);
                let tail = self.segments[seg].rows()[at..].to_vec();
                let segment = self.fill_segment(key, run, &tail)?;

                self.segments[seg].split_off(at);
                self.rows -= tail.len();
                self.place_segment(seg + 1, key, segment);
                Ok(())
            }
        }
    }

    fn open_segment(
        &mut self,
        pos: usize,
        key: &[u8],
        run: RunId,
        tail: &[Row],
    ) -> Result<(), ViewError> {
        let segment = self.fill_segment(key, run, tail)?;
        self.place_segment(pos, key, segment);
        Ok(())
    }

    /// Builds a detached segment holding `key` followed by `tail`.
    fn fill_segment(&self, key: &[u8], run: RunId, tail: &[Row]) -> Result<Segment, ViewError> {
        let mut segment = Segment::new(self.config.key_num_perseg, self.runs_num);
        let rows = iter::once((key, run)).chain(tail.iter().map(|r| (r.key.as_slice(), r.run)));

        for (k, r) in rows {
            match segment.insert(&*self.provider, &*self.comparator, k, r)? {
                SegmentInsert::Inserted => {}
                SegmentInsert::Full => {
                    return Err(ViewError::Internal(format!(
                        "split tail of {} rows overflows segment capacity {}",
                        tail.len(),
                        self.config.key_num_perseg
                    )));
                }
            }
        }
        Ok(segment)
    }

    fn place_segment(&mut self, pos: usize, anchor: &[u8], segment: Segment) {
        self.reserve_segment_slot();

        trace!(pos, anchor = %HexKey(anchor), rows = segment.len(), "open segment");
        self.rows += segment.len();
        self.anchors.insert(pos, anchor.to_vec());
        self.segments.insert(pos, segment);
    }

    /// Grows both arrays by a fixed increment when every slot is taken.
    fn reserve_segment_slot(&mut self) {
        if self.segments.len() < self.max_segment_size {
            return;
        }

        self.max_segment_size += self.config.segment_growth;
        let additional = self.max_segment_size - self.segments.len();
        self.anchors.reserve_exact(additional);
        self.segments.reserve_exact(additional);

        debug!(
            max_segment_size = self.max_segment_size,
            "grew segment arrays"
        );
    }

    // --------------------------------------------------------------------------------------------
    // Queries
    // --------------------------------------------------------------------------------------------

    /// Opens an unpositioned cursor over the index.
    pub fn new_iterator(self: &Arc<Self>) -> ViewIterator<P> {
        ViewIterator::new(Arc::clone(self))
    }

    /// Position `(segment, row)` of the first row with key `>= target`.
    ///
    /// Rows equal to `target` may end the segment before the one anchored
    /// at `target`, so the search starts from the last segment anchored
    /// strictly below it.
    pub(crate) fn locate(&self, target: &[u8]) -> Option<(usize, usize)> {
        if self.segments.is_empty() {
            return None;
        }

        let below = self
            .anchors
            .partition_point(|a| self.comparator.compare(a, target) == Ordering::Less);
        let Some(seg) = below.checked_sub(1) else {
            return Some((0, 0));
        };

        let row = self.segments[seg].lower_bound(&*self.comparator, target);
        if row < self.segments[seg].len() {
            Some((seg, row))
        } else if below < self.segments.len() {
            Some((below, 0))
        } else {
            None
        }
    }

    pub(crate) fn first_position(&self) -> Option<(usize, usize)> {
        (!self.segments.is_empty()).then_some((0, 0))
    }

    pub(crate) fn last_position(&self) -> Option<(usize, usize)> {
        let seg = self.segments.len().checked_sub(1)?;
        Some((seg, self.segments[seg].len() - 1))
    }

    pub(crate) fn successor(&self, seg: usize, row: usize) -> Option<(usize, usize)> {
        if row + 1 < self.segments[seg].len() {
            Some((seg, row + 1))
        } else if seg + 1 < self.segments.len() {
            Some((seg + 1, 0))
        } else {
            None
        }
    }

    pub(crate) fn predecessor(&self, seg: usize, row: usize) -> Option<(usize, usize)> {
        if row > 0 {
            Some((seg, row - 1))
        } else if seg > 0 {
            Some((seg - 1, self.segments[seg - 1].len() - 1))
        } else {
            None
        }
    }

    /// Rebuilds a physical cursor on the run that produced row `row` of
    /// segment `seg`, positioned exactly at that row.
    pub(crate) fn materialize(&self, seg: usize, row: usize) -> Result<BoxCursor, CursorError> {
        let segment = &self.segments[seg];
        let target = &segment.rows()[row];

        let reference = segment.reference_key(target.run).ok_or_else(|| {
            CursorError::Internal(format!(
                "segment {seg} has no reference cursor for run {}",
                target.run
            ))
        })?;

        let mut cursor = self.provider.new_run_cursor(target.run)?;
        cursor.seek(reference);
        for _ in 0..target.step {
            if !cursor.valid() {
                break;
            }
            cursor.next();
        }
        cursor.status()?;

        if !cursor.valid() || self.comparator.compare(cursor.key(), &target.key) != Ordering::Equal {
            return Err(CursorError::Corruption(format!(
                "run {} diverged from snapshot at segment {seg} row {row}",
                target.run
            )));
        }

        trace!(seg, row, run = target.run, step = target.step, "materialized");
        Ok(cursor)
    }

    // --------------------------------------------------------------------------------------------
    // Accessors
    // --------------------------------------------------------------------------------------------

    /// Number of keys indexed.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Segments in use.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Allocated segment slots.
    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, idx: usize) -> Option<&Segment> {
        self.segments.get(idx)
    }

    pub fn anchor(&self, idx: usize) -> Option<&[u8]> {
        self.anchors.get(idx).map(Vec::as_slice)
    }

    pub fn anchors(&self) -> impl Iterator<Item = &[u8]> {
        self.anchors.iter().map(Vec::as_slice)
    }

    pub fn runs_num(&self) -> usize {
        self.runs_num
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.comparator
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn stats(&self) -> IndexStats {
        let slots = self.segments.len() * self.config.key_num_perseg;
        IndexStats {
            segments: self.segments.len(),
            rows: self.rows,
            max_segment_size: self.max_segment_size,
            key_num_perseg: self.config.key_num_perseg,
            runs_num: self.runs_num,
            cached_cursors: self.segments.iter().map(Segment::cached_cursors).sum(),
            fill_ratio: if slots == 0 {
                0.0
            } else {
                self.rows as f64 / slots as f64
            },
        }
    }

    /// Emits anchors and per-segment rows at `debug` level.
    pub fn log_layout(&self) {
        for (idx, (anchor, segment)) in self.anchors.iter().zip(&self.segments).enumerate() {
            let rows: Vec<String> = segment
                .rows()
                .iter()
                .map(|r| format!("{}(r{},s{})", HexKey(&r.key), r.run, r.step))
                .collect();
            debug!(
                segment = idx,
                anchor = %HexKey(anchor),
                rows = %rows.join(" "),
                "layout"
            );
        }
    }
}
