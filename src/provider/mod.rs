//! Run providers: the store-side collaborator of the sorted view.
//!
//! A [`RunProvider`] exposes a snapshot of the store as `R` ordered runs.
//! It supplies the tagged merge cursor consumed once while building the
//! index, and independent single-run cursors used to materialize exact
//! positions at query time.
//!
//! [`RunSet`] is the in-memory provider shipped with the crate. It mirrors
//! the layering of an LSM store, newest first:
//!
//! 1. **Active** write buffer snapshot (run 0 when present).
//! 2. **Immutable** write buffers, newest to oldest.
//! 3. **Level** runs, in ascending level order.


use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::cursor::{BoxCursor, CursorError, RunId, TaggedCursor};
use crate::keys::Comparator;
use crate::merge::MergeCursor;
use crate::run::Run;

// ------------------------------------------------------------------------------------------------
// Provider trait
// ------------------------------------------------------------------------------------------------

/// Source of runs for building and querying a sorted view.
///
/// Cursor creation may be invoked concurrently from several view
/// iterators, hence `Send + Sync`.
pub trait RunProvider: Send + Sync {
    /// Number of runs, `R`. Run ids are `0..R`.
    fn runs_num(&self) -> usize;

    /// Order shared by every run.
    fn comparator(&self) -> Arc<dyn Comparator>;

    /// Unpositioned merge cursor over all runs.
    fn merge_cursor(&self) -> Result<Box<dyn TaggedCursor>, CursorError>;

    /// Unpositioned cursor over exactly one run.
    fn new_run_cursor(&self, run: RunId) -> Result<BoxCursor, CursorError>;
}

// ------------------------------------------------------------------------------------------------
// RunSet
// ------------------------------------------------------------------------------------------------

/// Which layer of the store a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// Snapshot of the mutable write buffer.
    Active,
    /// Frozen write buffer awaiting flush.
    Immutable,
    /// Sorted file at the given level.
    Level(usize),
}

/// In-memory snapshot of a layered store.
pub struct RunSet {
    runs: Vec<(RunKind, Arc<Run>)>,
    comparator: Arc<dyn Comparator>,
}

impl fmt::Debug for RunSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSet")
            .field("runs", &self.runs.iter().map(|(kind, _)| *kind).collect::<Vec<_>>())
            .field("total_entries", &self.total_entries())
            .finish()
    }
}

impl RunSet {
    /// Starts assembling a run set ordered by `comparator`.
    pub fn builder(comparator: Arc<dyn Comparator>) -> RunSetBuilder {
        RunSetBuilder {
            comparator,
            active: None,
            immutable: Vec::new(),
            levels: Vec::new(),
        }
    }

    /// Run with id `run`, if any.
    pub fn run(&self, run: RunId) -> Option<&Arc<Run>> {
        self.runs.get(run).map(|(_, r)| r)
    }

    /// Layer of run `run`, if any.
    pub fn kind(&self, run: RunId) -> Option<RunKind> {
        self.runs.get(run).map(|(kind, _)| *kind)
    }

    /// Number of entries across all runs.
    pub fn total_entries(&self) -> usize {
        self.runs.iter().map(|(_, r)| r.len()).sum()
    }
}

impl RunProvider for RunSet {
    fn runs_num(&self) -> usize {
        self.runs.len()
    }

    fn comparator(&self) -> Arc<dyn Comparator> {
        Arc::clone(&self.comparator)
    }

    fn merge_cursor(&self) -> Result<Box<dyn TaggedCursor>, CursorError> {
        let children = self
            .runs
            .iter()
            .map(|(_, run)| Box::new(run.cursor()) as BoxCursor)
            .collect();
        Ok(Box::new(MergeCursor::new(self.comparator(), children)))
    }

    fn new_run_cursor(&self, run: RunId) -> Result<BoxCursor, CursorError> {
        trace!(run, "new run cursor");
        let (_, r) = self.runs.get(run).ok_or(CursorError::RunNotFound(run))?;
        Ok(Box::new(r.cursor()))
    }
}

/// Collects runs by layer and assigns newest-first run ids.
pub struct RunSetBuilder {
    comparator: Arc<dyn Comparator>,
    active: Option<Arc<Run>>,
    immutable: Vec<Arc<Run>>,
    levels: Vec<(usize, Arc<Run>)>,
}

impl RunSetBuilder {
    /// Sets the active write buffer snapshot.
    pub fn active(mut self, run: Arc<Run>) -> Self {
        self.active = Some(run);
        self
    }

    /// Adds an immutable write buffer. Call newest first.
    pub fn immutable(mut self, run: Arc<Run>) -> Self {
        self.immutable.push(run);
        self
    }

    /// Adds a sorted file at `level`. Files within one level keep call order.
    pub fn level(mut self, level: usize, run: Arc<Run>) -> Self {
        self.levels.push((level, run));
        self
    }

    pub fn build(mut self) -> RunSet {
        // Stable: files on the same level keep insertion order.
        self.levels.sort_by_key(|(level, _)| *level);

        let mut runs = Vec::with_capacity(
            usize::from(self.active.is_some()) + self.immutable.len() + self.levels.len(),
        );
        if let Some(active) = self.active {
            runs.push((RunKind::Active, active));
        }
        runs.extend(self.immutable.into_iter().map(|r| (RunKind::Immutable, r)));
        runs.extend(
            self.levels
                .into_iter()
                .map(|(level, r)| (RunKind::Level(level), r)),
        );

        RunSet {
            runs,
            comparator: self.comparator,
        }
    }
}
