//! Atomic units of work against the underlying store.
//!
//! The database itself is an external collaborator; [`TransactionalStore`]
//! is the seam it plugs into. [`MemoryStore`] is an in-process implementation
//! whose transactions stage writes and apply them under a single write lock,
//! so readers observe either none or all of a commit.

use crate::cache::pagination::CursorKey;
use crate::core::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// An open unit of work.
#[async_trait]
pub trait Transaction: Send {
    /// Make every write visible at once
    async fn commit(self) -> Result<()>;

    /// Discard every write
    async fn rollback(self) -> Result<()>;
}

/// A store that can open transactions.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx>;
}

/// Keyed row returned by [`MemoryStore::scan_after`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record<V> {
    pub key: String,
    pub value: V,
}

impl<V> CursorKey for Record<V> {
    fn cursor_key(&self) -> String {
        self.key.clone()
    }
}

/// Ordered in-process key-value store.
#[derive(Debug)]
pub struct MemoryStore<V> {
    rows: Arc<RwLock<BTreeMap<String, V>>>,
}

impl<V> Clone for MemoryStore<V> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> MemoryStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.rows.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Up to `limit` rows with keys strictly greater than `cursor`, ascending
    pub fn scan_after(&self, cursor: Option<&str>, limit: usize) -> Vec<Record<V>> {
        let rows = self.rows.read();
        let lower = match cursor {
            Some(cursor) => Bound::Excluded(cursor.to_string()),
            None => Bound::Unbounded,
        };
        rows.range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(key, value)| Record {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

enum Write<V> {
    Put(String, V),
    Delete(String),
}

/// Staged writes against a [`MemoryStore`].
pub struct MemoryTransaction<V> {
    rows: Arc<RwLock<BTreeMap<String, V>>>,
    writes: Vec<Write<V>>,
}

impl<V: Clone> MemoryTransaction<V> {
    /// Read through this transaction's own staged writes
    pub fn get(&self, key: &str) -> Option<V> {
        for write in self.writes.iter().rev() {
            match write {
                Write::Put(k, v) if k == key => return Some(v.clone()),
                Write::Delete(k) if k == key => return None,
                _ => {},
            }
        }
        self.rows.read().get(key).cloned()
    }

    pub fn put(&mut self, key: impl Into<String>, value: V) {
        self.writes.push(Write::Put(key.into(), value));
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.writes.push(Write::Delete(key.into()));
    }
}

#[async_trait]
impl<V: Send + Sync + 'static> Transaction for MemoryTransaction<V> {
    async fn commit(self) -> Result<()> {
        let mut rows = self.rows.write();
        for write in self.writes {
            match write {
                Write::Put(key, value) => {
                    rows.insert(key, value);
                },
                Write::Delete(key) => {
                    rows.remove(&key);
                },
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> TransactionalStore for MemoryStore<V> {
    type Tx = MemoryTransaction<V>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(MemoryTransaction {
            rows: Arc::clone(&self.rows),
            writes: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_applies_all_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.put("a", 1);
        tx.put("b", 2);
        tx.delete("a");
        assert!(store.is_empty(), "staged writes must stay invisible");
        assert_eq!(tx.get("b"), Some(2));
        assert_eq!(tx.get("a"), None);

        tx.commit().await.unwrap();
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some(2));
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.put("a", 1);
        tx.rollback().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_scan_after_cursor() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        for key in ["post:001", "post:002", "post:003"] {
            tx.put(key, key.len());
        }
        tx.commit().await.unwrap();

        let keys: Vec<String> = store
            .scan_after(Some("post:001"), 10)
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["post:002", "post:003"]);
        assert_eq!(store.scan_after(None, 1).len(), 1);
    }
}
