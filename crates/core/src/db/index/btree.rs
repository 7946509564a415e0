//! Ordered single-column index.
//!
//! The backing structure is a `BTreeSet` of `(key, row_id)` pairs, so one
//! key can map to many rows and both point and range lookups are ordinary
//! range scans. Row-id sentinels turn a key bound into a pair bound.

use crate::db::value::Value;
use crate::error::IndexError;
use opaldb_primitives::RowId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Bound;

/// One `(key, row_id)` entry. Ordering is key-major, so all rows for a key
/// are adjacent and in row-id order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct IndexKey {
    key: Value,
    row_id: RowId,
}

/// Statistics reported by [`BTreeIndex::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub column: String,
    pub unique: bool,
    pub distinct_keys: usize,
    pub total_entries: usize,
}

/// Serialized form: ordered `(key, row_ids)` groups plus the unique flag.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub column: String,
    pub unique: bool,
    pub entries: Vec<(Value, Vec<RowId>)>,
}

#[derive(Debug)]
pub struct BTreeIndex {
    column: String,
    is_unique: bool,
    idx: BTreeSet<IndexKey>,
}

impl BTreeIndex {
    pub fn new(column: impl Into<String>, is_unique: bool) -> Self {
        BTreeIndex {
            column: column.into(),
            is_unique,
            idx: BTreeSet::new(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// Insert an entry. For unique indexes this fails if the key is already
    /// present under a different row id; re-inserting the same pair is a
    /// no-op. Null keys must be filtered out by the caller.
    pub fn insert(&mut self, key: Value, row_id: RowId) -> Result<(), IndexError> {
        if self.is_unique {
            if self.point_lookup(&key).into_iter().any(|id| id != row_id) {
                return Err(IndexError::Unique {
                    column: self.column.clone(),
                    key,
                });
            }
        }
        self.idx.insert(IndexKey { key, row_id });
        Ok(())
    }

    /// Remove one `(key, row_id)` pair, or every row for `key` when
    /// `row_id` is `None`.
    pub fn delete(&mut self, key: &Value, row_id: Option<RowId>) {
        match row_id {
            Some(row_id) => {
                self.idx.remove(&IndexKey {
                    key: key.clone(),
                    row_id,
                });
            }
            None => {
                let doomed: Vec<IndexKey> = self.seek_key(key).cloned().collect();
                for entry in doomed {
                    self.idx.remove(&entry);
                }
            }
        }
    }

    /// Move a row's entry from `old_key` to `new_key`: semantically a
    /// delete-then-insert, atomically. If the insert trips the unique
    /// constraint, the old entry is restored before the error is returned.
    pub fn update(
        &mut self,
        old_key: &Value,
        new_key: Value,
        row_id: RowId,
    ) -> Result<(), IndexError> {
        self.delete(old_key, Some(row_id));
        match self.insert(new_key, row_id) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.idx.insert(IndexKey {
                    key: old_key.clone(),
                    row_id,
                });
                Err(err)
            }
        }
    }

    /// Row ids for an exact key, in row-id order.
    pub fn point_lookup(&self, key: &Value) -> Vec<RowId> {
        self.seek_key(key).map(|e| e.row_id).collect()
    }

    /// True if any row is indexed under `key`.
    pub fn contains_key(&self, key: &Value) -> bool {
        self.seek_key(key).next().is_some()
    }

    fn seek_key<'a>(&'a self, key: &Value) -> impl Iterator<Item = &'a IndexKey> + 'a {
        let start = IndexKey {
            key: key.clone(),
            row_id: RowId::MIN,
        };
        let end = IndexKey {
            key: key.clone(),
            row_id: RowId::MAX,
        };
        self.idx.range(start..=end)
    }

    /// Row ids for keys within the given bounds, in ascending key order.
    /// Either bound may be omitted for a half-open or full scan.
    pub fn range_lookup(
        &self,
        low: Option<&Value>,
        high: Option<&Value>,
        inclusive_low: bool,
        inclusive_high: bool,
    ) -> Vec<RowId> {
        let start = match low {
            None => Bound::Unbounded,
            Some(key) => {
                let edge = IndexKey {
                    key: key.clone(),
                    row_id: if inclusive_low { RowId::MIN } else { RowId::MAX },
                };
                if inclusive_low {
                    Bound::Included(edge)
                } else {
                    Bound::Excluded(edge)
                }
            }
        };
        let end = match high {
            None => Bound::Unbounded,
            Some(key) => {
                let edge = IndexKey {
                    key: key.clone(),
                    row_id: if inclusive_high { RowId::MAX } else { RowId::MIN },
                };
                if inclusive_high {
                    Bound::Included(edge)
                } else {
                    Bound::Excluded(edge)
                }
            }
        };
        self.idx.range((start, end)).map(|e| e.row_id).collect()
    }

    pub fn clear(&mut self) {
        self.idx.clear();
    }

    /// Rebuild from `(key, row_id)` pairs; the caller filters nulls.
    pub fn build_from_rows(
        &mut self,
        rows: impl Iterator<Item = (Value, RowId)>,
    ) -> Result<(), IndexError> {
        for (key, row_id) in rows {
            self.insert(key, row_id)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> IndexStats {
        let mut distinct = 0;
        let mut prev: Option<&Value> = None;
        for entry in &self.idx {
            if prev != Some(&entry.key) {
                distinct += 1;
                prev = Some(&entry.key);
            }
        }
        IndexStats {
            column: self.column.clone(),
            unique: self.is_unique,
            distinct_keys: distinct,
            total_entries: self.idx.len(),
        }
    }

    /// Grouped, ordered form for the on-disk index file.
    pub fn snapshot(&self) -> IndexSnapshot {
        let mut entries: Vec<(Value, Vec<RowId>)> = Vec::new();
        for e in &self.idx {
            match entries.last_mut() {
                Some((key, ids)) if *key == e.key => ids.push(e.row_id),
                _ => entries.push((e.key.clone(), vec![e.row_id])),
            }
        }
        IndexSnapshot {
            column: self.column.clone(),
            unique: self.is_unique,
            entries,
        }
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let mut idx = BTreeSet::new();
        for (key, ids) in snapshot.entries {
            for row_id in ids {
                idx.insert(IndexKey {
                    key: key.clone(),
                    row_id,
                });
            }
        }
        BTreeIndex {
            column: snapshot.column,
            is_unique: snapshot.unique,
            idx,
        }
    }
}
