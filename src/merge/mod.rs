//! K-way merge cursor with provenance tags.
//!
//! [`MergeCursor`] combines one cursor per run into a single ascending
//! stream. Child `i` is run `i`, so the index of the child that supplies
//! the current key is that key's **provenance tag**.
//!
//! Every step compares the current key of every child: this is the
//! per-step `O(R)` cost the sorted view exists to avoid. Stores keep the
//! number of runs small, so children live in a flat vector and the smallest
//! (or largest, when moving backwards) is found by a linear pass.
//!
//! # Direction changes
//!
//! While moving forward every non-current child is positioned after the
//! current key; while moving backward, before it. Switching direction
//! re-seeks every non-current child around the current key first.


use std::cmp::Ordering;
use std::sync::Arc;

use crate::cursor::{BoxCursor, Cursor, CursorError, RunId, TaggedCursor};
use crate::keys::Comparator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// Merges per-run cursors into one ascending stream and reports which run
/// produced each key.
pub struct MergeCursor {
    comparator: Arc<dyn Comparator>,

    /// One cursor per run, indexed by run id.
    children: Vec<BoxCursor>,

    /// Index of the child holding the current key.
    current: Option<usize>,

    direction: Direction,
}

impl MergeCursor {
    /// Creates a merge over `children`; child `i` is reported as run `i`.
    pub fn new(comparator: Arc<dyn Comparator>, children: Vec<BoxCursor>) -> Self {
        Self {
            comparator,
            children,
            current: None,
            direction: Direction::Forward,
        }
    }

    fn find_smallest(&mut self) {
        let mut smallest: Option<usize> = None;
        for (idx, child) in self.children.iter().enumerate() {
            if !child.valid() {
                continue;
            }
            smallest = match smallest {
                Some(best)
                    if self.comparator.compare(child.key(), self.children[best].key())
                        != Ordering::Less =>
                {
                    Some(best)
                }
                _ => Some(idx),
            };
        }
        self.current = smallest;
    }

    fn find_largest(&mut self) {
        let mut largest: Option<usize> = None;
        for (idx, child) in self.children.iter().enumerate().rev() {
            if !child.valid() {
                continue;
            }
            largest = match largest {
                Some(best)
                    if self.comparator.compare(child.key(), self.children[best].key())
                        != Ordering::Greater =>
                {
                    Some(best)
                }
                _ => Some(idx),
            };
        }
        self.current = largest;
    }

    fn current_index(&self) -> usize {
        self.current.expect("MergeCursor is not positioned")
    }
}

impl Cursor for MergeCursor {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        for child in &mut self.children {
            child.seek_to_first();
        }
        self.find_smallest();
        self.direction = Direction::Forward;
    }

    fn seek_to_last(&mut self) {
        for child in &mut self.children {
            child.seek_to_last();
        }
        self.find_largest();
        self.direction = Direction::Reverse;
    }

    fn seek(&mut self, target: &[u8]) {
        for child in &mut self.children {
            child.seek(target);
        }
        self.find_smallest();
        self.direction = Direction::Forward;
    }

    fn next(&mut self) {
        let current = self.current_index();

        if self.direction != Direction::Forward {
            let key = self.children[current].key().to_vec();
            for (idx, child) in self.children.iter_mut().enumerate() {
                if idx == current {
                    continue;
                }
                child.seek(&key);
                if child.valid() && self.comparator.compare(&key, child.key()) == Ordering::Equal {
                    child.next();
                }
            }
            self.direction = Direction::Forward;
        }

        self.children[current].next();
        self.find_smallest();
    }

    fn prev(&mut self) {
        let current = self.current_index();

        if self.direction != Direction::Reverse {
            let key = self.children[current].key().to_vec();
            for (idx, child) in self.children.iter_mut().enumerate() {
                if idx == current {
                    continue;
                }
                child.seek(&key);
                if child.valid() {
                    // First entry >= key; step back to land before it.
                    child.prev();
                } else {
                    child.seek_to_last();
                }
            }
            self.direction = Direction::Reverse;
        }

        self.children[current].prev();
        self.find_largest();
    }

    fn key(&self) -> &[u8] {
        self.children[self.current_index()].key()
    }

    fn value(&self) -> &[u8] {
        self.children[self.current_index()].value()
    }

    fn status(&self) -> Result<(), CursorError> {
        self.children.iter().try_for_each(|child| child.status())
    }
}

impl TaggedCursor for MergeCursor {
    fn provenance_tag(&self) -> RunId {
        self.current_index()
    }

    fn runs_num(&self) -> usize {
        self.children.len()
    }
}
