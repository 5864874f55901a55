//! # Sorted view
//!
//! A segmented provenance index built once over the merged key stream of a
//! [`RunProvider`](crate::provider::RunProvider), and the cursor that
//! answers ordered queries through it.
//!
//! ## Design Overview
//!
//! The merged stream is cut into capacity-bounded [`Segment`]s. Each segment
//! records, per key, the run that produced it (*provenance tag*) and its
//! ordinal among the segment's keys from that run (*step*). The first key of
//! every segment is its **anchor**; anchors never decrease.
//!
//! ```text
//! runs:      r0 = {a, c, e}    r1 = {b, d, f}
//! anchors:   [ a ]                     [ d ]
//! segments:  a(r0,0) b(r1,0) c(r0,1)   d(r1,0) e(r0,0) f(r1,1)
//! ```
//!
//! A query binary-searches the anchors, then the segment's keys, and
//! rebuilds a physical cursor by seeking a fresh single-run cursor to the
//! run's first key in that segment and advancing it `step` times. No
//! cross-run key comparison is made.
//!
//! A key held by several runs appears once per run, in merge order (lower
//! run id first). Such rows may straddle a segment boundary; a seek still
//! lands on the first of them.
//!
//! ## Lifecycle
//!
//! - [`AnchorIndex::build`] consumes one ascending pass of the merge cursor.
//! - After build the index is immutable and shared through `Arc`.
//! - [`ViewIterator`]s borrow the index read-only; each owns the single
//!   cursor it materialized.
//!
//! The index is a point-in-time snapshot: it does not observe later
//! mutations of the store, and it does not resolve tombstones or
//! overwritten versions.

mod index;
mod iterator;
mod segment;

#[cfg(test)]
mod tests;

pub use index::{AnchorIndex, IndexStats};
pub use iterator::{ViewIterator, ViewPosition};
pub use segment::{Row, Segment};

use thiserror::Error;

use crate::cursor::{CursorError, RunId};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned while building or configuring a sorted view.
///
/// Query-time failures are not returned here; they surface through
/// [`Cursor::status`](crate::cursor::Cursor::status) on the iterator.
#[derive(Debug, Error)]
pub enum ViewError {
    /// Error reported by the run provider or one of its cursors.
    #[error("Provider error: {0}")]
    Provider(#[from] CursorError),

    /// Invalid configuration parameter.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The run already contributed this key to the index.
    #[error("Duplicate key ({} bytes)", .0.len())]
    DuplicateKey(Vec<u8>),

    /// Provenance tag outside `[0, runs_num)`.
    #[error("Run {run} out of range (runs_num = {runs_num})")]
    RunOutOfRange { run: RunId, runs_num: usize },

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}
