//! # sortedview
//!
//! A **sorted view** over a layered (LSM-style) key-value store: a one-time
//! index over the merged key stream of several sorted runs that lets range
//! queries seek and step without comparing keys across runs.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use sortedview::{BytewiseComparator, Comparator, Cursor, Run, RunSet, SortedView, ViewConfig};
//!
//! let cmp: Arc<dyn Comparator> = Arc::new(BytewiseComparator);
//! let older = Run::new(
//!     vec![(b"a".to_vec(), b"1".to_vec()), (b"c".to_vec(), b"3".to_vec())],
//!     Arc::clone(&cmp),
//! )
//! .unwrap();
//! let newer = Run::new(vec![(b"b".to_vec(), b"2".to_vec())], Arc::clone(&cmp)).unwrap();
//!
//! let runs = RunSet::builder(cmp)
//!     .active(Arc::new(newer))
//!     .level(0, Arc::new(older))
//!     .build();
//!
//! let view = SortedView::build(Arc::new(runs), ViewConfig::default()).unwrap();
//! assert_eq!(view.len(), 3);
//!
//! // Ordered cursor
//! let mut it = view.iter();
//! it.seek(b"b");
//! assert_eq!(it.key(), b"b");
//! it.next();
//! assert_eq!(it.value(), b"3");
//!
//! // Range scan
//! let pairs = view.scan(b"a", b"c").unwrap();
//! assert_eq!(pairs.len(), 2);
//! ```
//!
//! ## Layout
//!
//! - [`keys`]: comparators and the internal key format.
//! - [`cursor`]: the cursor interface every ordered source implements.
//! - [`run`]: immutable sorted runs and their native cursors.
//! - [`merge`]: k-way merge cursor reporting provenance tags.
//! - [`provider`]: the [`RunProvider`] seam and the in-memory [`RunSet`].
//! - [`view`]: the anchor index and its iterator.

pub mod cursor;
pub mod keys;
pub mod merge;
pub mod provider;
pub mod run;
pub mod view;

use std::cmp::Ordering;
use std::sync::Arc;

pub use cursor::{BoxCursor, Cursor, CursorError, EmptyCursor, Entries, KeyValue, RunId, TaggedCursor};
pub use keys::{BytewiseComparator, Comparator, InternalKeyComparator, KeyKind};
pub use merge::MergeCursor;
pub use provider::{RunKind, RunProvider, RunSet};
pub use run::{Run, RunCursor, RunError};
pub use view::{AnchorIndex, IndexStats, ViewError, ViewIterator, ViewPosition};

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for building a sorted view.
///
/// All fields have defaults via [`ViewConfig::default()`]. The configuration
/// is validated when the index is created.
///
/// # Example
///
/// ```rust
/// use sortedview::ViewConfig;
///
/// let config = ViewConfig {
///     key_num_perseg: 32,
///     ..ViewConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConfig {
    /// Maximum number of keys per segment.
    ///
    /// Larger segments mean fewer anchors but longer step replay when
    /// materializing a position.
    ///
    /// Default: 20. Must be ≥ 1.
    pub key_num_perseg: usize,

    /// Number of segment slots added whenever the segment arrays are full.
    ///
    /// Default: 5. Must be ≥ 1.
    pub segment_growth: usize,

    /// Segment slots reserved up front.
    ///
    /// Default: 5. Must be ≥ 1.
    pub initial_segments: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            key_num_perseg: 20,
            segment_growth: 5,
            initial_segments: 5,
        }
    }
}

impl ViewConfig {
    /// Validates all configuration parameters.
    pub fn validate(&self) -> Result<(), ViewError> {
        if self.key_num_perseg < 1 {
            return Err(ViewError::InvalidConfig(
                "key_num_perseg must be >= 1".into(),
            ));
        }
        if self.segment_growth < 1 {
            return Err(ViewError::InvalidConfig(
                "segment_growth must be >= 1".into(),
            ));
        }
        if self.initial_segments < 1 {
            return Err(ViewError::InvalidConfig(
                "initial_segments must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Sorted view handle
// ------------------------------------------------------------------------------------------------

/// Shareable handle to a built anchor index.
///
/// Cloning is cheap; every clone refers to the same index. Each call to
/// [`SortedView::iter`] yields an independent cursor, so iterators can be
/// moved to other threads freely.
pub struct SortedView<P: RunProvider> {
    index: Arc<AnchorIndex<P>>,
}

impl<P: RunProvider> Clone for SortedView<P> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
        }
    }
}

impl<P: RunProvider> std::fmt::Debug for SortedView<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedView")
            .field("index", &self.index)
            .finish()
    }
}

impl<P: RunProvider> SortedView<P> {
    /// Builds the view from one pass over `provider`'s merge cursor.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::InvalidConfig`] for an out-of-range config and
    /// [`ViewError::Provider`] if the provider reports an error during the
    /// pass.
    pub fn build(provider: Arc<P>, config: ViewConfig) -> Result<Self, ViewError> {
        let index = AnchorIndex::build(provider, config)?;
        Ok(Self {
            index: Arc::new(index),
        })
    }

    /// Opens an unpositioned cursor over the view.
    pub fn iter(&self) -> ViewIterator<P> {
        self.index.new_iterator()
    }

    /// Collects all pairs with keys in the half-open range `[start, end)`.
    ///
    /// Returns an empty `Vec` when `start >= end`.
    pub fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<KeyValue>, ViewError> {
        let comparator = Arc::clone(self.index.comparator());
        if comparator.compare(start, end) != Ordering::Less {
            return Ok(Vec::new());
        }

        let mut it = self.iter();
        it.seek(start);
        let pairs = Entries::new(&mut it)
            .take_while(|(key, _)| comparator.compare(key, end) == Ordering::Less)
            .collect();
        it.status()?;
        Ok(pairs)
    }

    /// Number of keys indexed.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    pub fn index(&self) -> &Arc<AnchorIndex<P>> {
        &self.index
    }
}

/// Builds a sorted view with `key_num_perseg` keys per segment and default
/// growth settings.
pub fn build<P: RunProvider>(
    provider: Arc<P>,
    key_num_perseg: usize,
) -> Result<SortedView<P>, ViewError> {
    SortedView::build(
        provider,
        ViewConfig {
            key_num_perseg,
            ..ViewConfig::default()
        },
    )
}
