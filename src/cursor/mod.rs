//! Cursor interface shared by every ordered source in the crate.
//!
//! A [`Cursor`] is a positioned, bidirectional view over an ascending
//! sequence of `(key, value)` pairs. Three families implement it:
//!
//! - [`RunCursor`](crate::run::RunCursor): native cursor over one run.
//! - [`MergeCursor`](crate::merge::MergeCursor): k-way merge over all runs.
//! - [`ViewIterator`](crate::view::ViewIterator): cursor resolved through
//!   the sorted view instead of live merging.
//!
//! Only the merge cursor knows which run produced its current key; that
//! capability is the separate [`TaggedCursor`] trait.
//!
//! # Calling convention
//!
//! - `key()`, `value()`, `next()` and `prev()` require `valid()`; calling
//!   them on an invalid cursor is a programming error and panics.
//! - Failures are not returned from positioning calls. A cursor that hits
//!   an error becomes invalid and reports the error from `status()`.


use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Types
// ------------------------------------------------------------------------------------------------

/// Identifier of a run, in `[0, runs_num)`.
pub type RunId = usize;

/// A single key-value pair copied out of a cursor.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Owned, type-erased cursor.
pub type BoxCursor = Box<dyn Cursor>;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors reported through [`Cursor::status`].
///
/// `Clone` so a cursor can keep reporting the same failure on every
/// `status()` call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CursorError {
    /// The underlying run data is inconsistent.
    #[error("Corruption: {0}")]
    Corruption(String),

    /// A cursor was requested for a run that does not exist.
    #[error("Run {0} not found")]
    RunNotFound(RunId),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Traits
// ------------------------------------------------------------------------------------------------

/// Bidirectional cursor over an ascending key sequence.
pub trait Cursor: Send + Sync {
    /// Returns `true` if the cursor is positioned at an entry.
    fn valid(&self) -> bool;

    /// Positions at the first entry; invalid if there is none.
    fn seek_to_first(&mut self);

    /// Positions at the last entry; invalid if there is none.
    fn seek_to_last(&mut self);

    /// Positions at the first entry whose key is `>= target`.
    fn seek(&mut self, target: &[u8]);

    /// Moves to the following entry.
    fn next(&mut self);

    /// Moves to the preceding entry.
    fn prev(&mut self);

    /// Key of the current entry.
    fn key(&self) -> &[u8];

    /// Value of the current entry.
    fn value(&self) -> &[u8];

    /// First error encountered, if any.
    fn status(&self) -> Result<(), CursorError>;
}

/// A cursor over the union of several runs that knows which run produced
/// its current key.
pub trait TaggedCursor: Cursor {
    /// Run id of the current entry. Requires `valid()`.
    fn provenance_tag(&self) -> RunId;

    /// Total number of runs this cursor merges.
    fn runs_num(&self) -> usize;
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn valid(&self) -> bool {
        (**self).valid()
    }

    fn seek_to_first(&mut self) {
        (**self).seek_to_first()
    }

    fn seek_to_last(&mut self) {
        (**self).seek_to_last()
    }

    fn seek(&mut self, target: &[u8]) {
        (**self).seek(target)
    }

    fn next(&mut self) {
        (**self).next()
    }

    fn prev(&mut self) {
        (**self).prev()
    }

    fn key(&self) -> &[u8] {
        (**self).key()
    }

    fn value(&self) -> &[u8] {
        (**self).value()
    }

    fn status(&self) -> Result<(), CursorError> {
        (**self).status()
    }
}

// ------------------------------------------------------------------------------------------------
// Empty cursor
// ------------------------------------------------------------------------------------------------

/// A cursor over nothing, optionally carrying an error status.
///
/// Used for zero-run providers and to report a failure through the cursor
/// interface.
#[derive(Debug, Clone, Default)]
pub struct EmptyCursor {
    status: Option<CursorError>,
}

impl EmptyCursor {
    pub fn new() -> Self {
        Self { status: None }
    }

    /// An empty cursor whose `status()` reports `err`.
    pub fn with_error(err: CursorError) -> Self {
        Self { status: Some(err) }
    }
}

impl Cursor for EmptyCursor {
    fn valid(&self) -> bool {
        false
    }

    fn seek_to_first(&mut self) {}

    fn seek_to_last(&mut self) {}

    fn seek(&mut self, _target: &[u8]) {}

    fn next(&mut self) {
        panic!("next() on EmptyCursor");
    }

    fn prev(&mut self) {
        panic!("prev() on EmptyCursor");
    }

    fn key(&self) -> &[u8] {
        panic!("key() on EmptyCursor");
    }

    fn value(&self) -> &[u8] {
        panic!("value() on EmptyCursor");
    }

    fn status(&self) -> Result<(), CursorError> {
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Iterator adapter
// ------------------------------------------------------------------------------------------------

/// Adapts a positioned cursor into a std [`Iterator`] of owned pairs,
/// starting at the cursor's current entry and walking forward.
///
/// Stops when the cursor becomes invalid; the caller checks `status()`
/// afterwards to tell exhaustion from failure.
pub struct Entries<'a, C: Cursor + ?Sized> {
    cursor: &'a mut C,
    started: bool,
}

impl<'a, C: Cursor + ?Sized> Entries<'a, C> {
    pub fn new(cursor: &'a mut C) -> Self {
        Self {
            cursor,
            started: false,
        }
    }
}

impl<C: Cursor + ?Sized> Iterator for Entries<'_, C> {
    type Item = KeyValue;

    fn next(&mut self) -> Option<Self::Item> {
        if self.started && self.cursor.valid() {
            self.cursor.next();
        }
        self.started = true;

        if !self.cursor.valid() {
            return None;
        }
        Some((self.cursor.key().to_vec(), self.cursor.value().to_vec()))
    }
}
