//! Small integer newtypes shared across the engine.
//!
//! Keeping these in their own crate lets the parser and the core agree on
//! identifier types without depending on each other.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a row within a table.
///
/// Assigned by the storage engine, strictly increasing per table and never
/// reused once issued, even after the row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub i64);

impl RowId {
    /// Smallest possible row id. Used as a range sentinel by the index engine.
    pub const MIN: Self = RowId(i64::MIN);
    /// Largest possible row id. Used as a range sentinel by the index engine.
    pub const MAX: Self = RowId(i64::MAX);

    /// The first row id a fresh table hands out.
    pub const FIRST: Self = RowId(1);

    /// The id following this one.
    pub fn next(self) -> Self {
        RowId(self.0 + 1)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        RowId(id)
    }
}

impl From<RowId> for i64 {
    fn from(id: RowId) -> Self {
        id.0
    }
}

/// Identifies a column by its position within a table's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColId(pub u32);

impl ColId {
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ColId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ColId {
    fn from(id: u32) -> Self {
        ColId(id)
    }
}

impl From<usize> for ColId {
    fn from(id: usize) -> Self {
        ColId(id as u32)
    }
}

impl From<ColId> for usize {
    fn from(id: ColId) -> Self {
        id.idx()
    }
}
