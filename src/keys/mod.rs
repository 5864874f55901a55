//! Key ordering and internal key encoding.
//!
//! Every run in the store is ordered by a [`Comparator`]. Two comparators
//! are provided:
//!
//! - [`BytewiseComparator`]: plain lexicographic byte order.
//! - [`InternalKeyComparator`]: orders *internal keys* by
//!   `(user key ASC, LSN DESC)`, so the newest version of a user key sorts
//!   first.
//!
//! # Internal key layout
//!
//! ```text
//! [USER_KEY_BYTES][TRAILER_U64_LE]
//! ```
//!
//! The trailer packs `lsn << 8 | kind`. Because the LSN is part of the key,
//! every version of a user key is a distinct, strictly ordered key, which is
//! what lets a multi-run merge produce a strictly ascending stream.


use std::cmp::{Ordering, Reverse};
use std::fmt;

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Size of the packed `(lsn, kind)` trailer appended to every internal key.
pub const TRAILER_SIZE: usize = std::mem::size_of::<u64>();

/// Largest LSN that fits in the 56 bits left after packing the kind byte.
pub const MAX_LSN: u64 = (1 << 56) - 1;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors produced while encoding or parsing internal keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Key is shorter than the trailer.
    #[error("Internal key truncated: {0} bytes")]
    Truncated(usize),

    /// Trailer carries an unknown kind byte.
    #[error("Unknown key kind: {0}")]
    UnknownKind(u8),

    /// LSN does not fit in 56 bits.
    #[error("LSN {0} exceeds maximum")]
    LsnOverflow(u64),
}

// ------------------------------------------------------------------------------------------------
// Comparators
// ------------------------------------------------------------------------------------------------

/// Total order over keys, supplied by the store.
pub trait Comparator: Send + Sync {
    /// Three-way comparison of `a` and `b`.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Stable name, used in logs.
    fn name(&self) -> &'static str;
}

/// Lexicographic byte order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &'static str {
        "sortedview.BytewiseComparator"
    }
}

/// Orders internal keys by user key ascending (via the wrapped user
/// comparator), then by packed `(lsn, kind)` trailer descending.
///
/// A key shorter than the trailer is treated as a bare user key with no
/// trailer. It sorts before every version of the same user key, which is
/// where a lookup by user key should land.
#[derive(Debug, Default, Clone, Copy)]
pub struct InternalKeyComparator<C = BytewiseComparator> {
    user: C,
}

impl<C: Comparator> InternalKeyComparator<C> {
    pub fn new(user: C) -> Self {
        Self { user }
    }

    /// Returns the comparator used for the user-key portion.
    pub fn user_comparator(&self) -> &C {
        &self.user
    }
}

impl<C: Comparator> Comparator for InternalKeyComparator<C> {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let (a_user, a_trailer) = split_trailer(a);
        let (b_user, b_trailer) = split_trailer(b);

        // Trailers descend; a missing one ranks above any real trailer.
        self.user
            .compare(a_user, b_user)
            .then_with(|| a_trailer.map(Reverse).cmp(&b_trailer.map(Reverse)))
    }

    fn name(&self) -> &'static str {
        "sortedview.InternalKeyComparator"
    }
}

// ------------------------------------------------------------------------------------------------
// Internal keys
// ------------------------------------------------------------------------------------------------

/// Kind of mutation an internal key records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum KeyKind {
    /// Point deletion (tombstone).
    Delete = 0,
    /// Point put.
    Put = 1,
}

impl TryFrom<u8> for KeyKind {
    type Error = KeyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(KeyKind::Delete),
            1 => Ok(KeyKind::Put),
            other => Err(KeyError::UnknownKind(other)),
        }
    }
}

/// A borrowed, decoded view of an internal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedKey<'a> {
    /// User-visible key bytes.
    pub user_key: &'a [u8],

    /// Log sequence number of this version.
    pub lsn: u64,

    /// Mutation kind.
    pub kind: KeyKind,
}

impl fmt::Display for ParsedKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' @ {} : {:?}",
            self.user_key.escape_ascii(),
            self.lsn,
            self.kind
        )
    }
}

/// Encodes `user_key` with an `(lsn, kind)` trailer.
pub fn encode_internal_key(user_key: &[u8], lsn: u64, kind: KeyKind) -> Result<Vec<u8>, KeyError> {
    if lsn > MAX_LSN {
        return Err(KeyError::LsnOverflow(lsn));
    }

    let mut out = Vec::with_capacity(user_key.len() + TRAILER_SIZE);
    out.extend_from_slice(user_key);
    out.extend_from_slice(&((lsn << 8) | kind as u64).to_le_bytes());
    Ok(out)
}

/// Splits an internal key into user key, LSN and kind.
pub fn parse_internal_key(key: &[u8]) -> Result<ParsedKey<'_>, KeyError> {
    if key.len() < TRAILER_SIZE {
        return Err(KeyError::Truncated(key.len()));
    }

    let (user_key, trailer) = key.split_at(key.len() - TRAILER_SIZE);
    let packed = decode_trailer(trailer);
    let kind = KeyKind::try_from((packed & 0xff) as u8)?;

    Ok(ParsedKey {
        user_key,
        lsn: packed >> 8,
        kind,
    })
}

/// Returns the user-key prefix of an internal key.
pub fn extract_user_key(key: &[u8]) -> Result<&[u8], KeyError> {
    if key.len() < TRAILER_SIZE {
        return Err(KeyError::Truncated(key.len()));
    }
    Ok(&key[..key.len() - TRAILER_SIZE])
}

fn split_trailer(key: &[u8]) -> (&[u8], Option<u64>) {
    match key.len().checked_sub(TRAILER_SIZE) {
        Some(at) => (&key[..at], Some(decode_trailer(&key[at..]))),
        None => (key, None),
    }
}

fn decode_trailer(trailer: &[u8]) -> u64 {
    let mut buf = [0u8; TRAILER_SIZE];
    buf.copy_from_slice(trailer);
    u64::from_le_bytes(buf)
}

/// Hex rendering of a key for log fields; long keys are truncated.
pub(crate) struct HexKey<'a>(pub &'a [u8]);

impl fmt::Display for HexKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= 32 {
            for byte in self.0 {
                write!(f, "{:02x}", byte)?;
            }
        } else {
            for byte in &self.0[..16] {
                write!(f, "{:02x}", byte)?;
            }
            write!(f, "...[{} bytes]", self.0.len())?;
        }
        Ok(())
    }
}
