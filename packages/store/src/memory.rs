//! In-process document store.
//!
//! Used for dry runs and tests. [`MemoryStore::set_unavailable`] simulates
//! an unreachable store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::{
    CommitResult, Document, DocumentStore, StoreError, WriteMode, assign_id, plan_batch,
};

#[derive(Default)]
struct Collection {
    documents: Vec<(String, Document)>,
    ids: BTreeSet<String>,
}

/// A [`DocumentStore`] held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Collection>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty, available store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`]
    /// until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Collection>>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "memory store marked unavailable".to_string(),
            });
        }
        Ok(self
            .collections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner))
    }
}

impl DocumentStore for MemoryStore {
    fn insert_many(
        &self,
        collection: &str,
        mut documents: Vec<Document>,
        mode: WriteMode,
    ) -> Result<CommitResult, StoreError> {
        let mut collections = self.lock()?;
        let target = collections.entry(collection.to_string()).or_default();

        let attempted = documents.len();
        let ids: Vec<String> = documents.iter_mut().map(assign_id).collect();
        let mut batch_ids = BTreeSet::new();

        let (accepted, failures) = plan_batch(&ids, mode, |_, id| {
            if target.ids.contains(id) {
                Some(format!("duplicate key: {id} already exists in {collection}"))
            } else if !batch_ids.insert(id.to_string()) {
                Some(format!("duplicate key: {id} repeated within batch"))
            } else {
                None
            }
        });

        let last_id = accepted.last().map(|&i| ids[i].clone());
        let committed = accepted.len();

        let mut slots: Vec<Option<Document>> = documents.into_iter().map(Some).collect();
        for i in accepted {
            if let Some(document) = slots[i].take() {
                target.ids.insert(ids[i].clone());
                target.documents.push((ids[i].clone(), document));
            }
        }

        Ok(CommitResult {
            attempted,
            committed,
            last_id,
            failures,
        })
    }

    fn upsert(&self, collection: &str, key: &str, document: Document) -> Result<(), StoreError> {
        let mut collections = self.lock()?;
        let target = collections.entry(collection.to_string()).or_default();

        if let Some(slot) = target.documents.iter_mut().find(|(id, _)| id == key) {
            slot.1 = document;
        } else {
            target.ids.insert(key.to_string());
            target.documents.push((key.to_string(), document));
        }
        Ok(())
    }

    fn find_one(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.lock()?;
        Ok(collections.get(collection).and_then(|c| {
            c.documents
                .iter()
                .find(|(id, _)| id == key)
                .map(|(_, document)| document.clone())
        }))
    }

    fn delete_one(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let mut collections = self.lock()?;
        let Some(target) = collections.get_mut(collection) else {
            return Ok(false);
        };
        if !target.ids.remove(key) {
            return Ok(false);
        }
        target.documents.retain(|(id, _)| id != key);
        Ok(true)
    }

    fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map(|c| c.documents.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default())
    }

    fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map_or(0, |c| c.documents.len() as u64))
    }

    fn drop_collection(&self, collection: &str) -> Result<u64, StoreError> {
        let mut collections = self.lock()?;
        Ok(collections
            .remove(collection)
            .map_or(0, |c| c.documents.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn docs(ids: &[&str]) -> Vec<Document> {
        ids.iter()
            .map(|id| json!({"_id": id}).as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn ordered_insert_stops_at_existing_id() {
        let store = MemoryStore::new();
        store.insert_many("c", docs(&["3"]), WriteMode::Ordered).unwrap();

        let result = store
            .insert_many("c", docs(&["1", "2", "3", "4"]), WriteMode::Ordered)
            .unwrap();
        assert_eq!(result.committed, 2);
        assert_eq!(result.last_id.as_deref(), Some("2"));
        assert_eq!(result.unattempted(), 1);
        assert_eq!(store.count("c").unwrap(), 3);
    }

    #[test]
    fn unordered_insert_continues_past_failures() {
        let store = MemoryStore::new();
        store.insert_many("c", docs(&["3"]), WriteMode::Ordered).unwrap();

        let result = store
            .insert_many("c", docs(&["1", "3", "4"]), WriteMode::Unordered)
            .unwrap();
        assert_eq!(result.committed, 2);
        assert_eq!(result.last_id.as_deref(), Some("4"));
        assert_eq!(result.failures.len(), 1);
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(
            store
                .insert_many("c", docs(&["1"]), WriteMode::Ordered)
                .unwrap_err()
                .is_unavailable()
        );
        assert!(store.count("c").is_err());

        store.set_unavailable(false);
        assert_eq!(store.count("c").unwrap(), 0);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let store = MemoryStore::new();
        let first = json!({"v": 1}).as_object().unwrap().clone();
        let second = json!({"v": 2}).as_object().unwrap().clone();
        store.upsert("audit", "k", first).unwrap();
        store.upsert("audit", "k", second).unwrap();

        assert_eq!(store.count("audit").unwrap(), 1);
        assert_eq!(store.find_one("audit", "k").unwrap().unwrap()["v"], 2);
        assert_eq!(store.drop_collection("audit").unwrap(), 1);
        assert!(store.find_all("audit").unwrap().is_empty());
    }

    #[test]
    fn delete_one_frees_the_id() {
        let store = MemoryStore::new();
        store.insert_many("c", docs(&["1", "2"]), WriteMode::Ordered).unwrap();

        assert!(store.delete_one("c", "1").unwrap());
        assert!(!store.delete_one("c", "1").unwrap());
        assert!(!store.delete_one("missing", "1").unwrap());
        assert_eq!(store.count("c").unwrap(), 1);

        let result = store.insert_many("c", docs(&["1"]), WriteMode::Ordered).unwrap();
        assert!(result.is_clean());
    }
}
