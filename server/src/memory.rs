//! In-process document store for tests and local experiments.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{Collection, DocumentStore, Filter};
use crate::types::{Document, InsertOneResult, UpdateResult};

#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<Collection, Vec<Document>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every operation fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.collections.get(&collection).map(|c| c.len()).unwrap_or(0)
    }

    /// Snapshot of a collection in insertion order.
    pub fn all(&self, collection: Collection) -> Vec<Document> {
        self.collections
            .get(&collection)
            .map(|c| c.value().clone())
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        self.check()?;
        let Some(docs) = self.collections.get(&collection) else {
            return Ok(None);
        };
        let found = docs.iter().find(|d| filter.matches(d)).cloned();
        Ok(found)
    }

    async fn insert_one(
        &self,
        collection: Collection,
        mut doc: Document,
    ) -> Result<InsertOneResult, StoreError> {
        self.check()?;
        let id = Uuid::new_v4().to_string();
        doc.insert("_id".into(), Value::String(id.clone()));
        self.collections.entry(collection).or_default().push(doc);
        Ok(InsertOneResult {
            acknowledged: true,
            inserted_id: id,
        })
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        set: Document,
    ) -> Result<UpdateResult, StoreError> {
        self.check()?;
        let mut result = UpdateResult {
            acknowledged: true,
            matched_count: 0,
            modified_count: 0,
        };
        if let Some(mut docs) = self.collections.get_mut(&collection) {
            if let Some(doc) = docs.iter_mut().find(|d| filter.matches(d)) {
                result.matched_count = 1;
                let unchanged = set.iter().all(|(k, v)| doc.get(k) == Some(v));
                if !unchanged {
                    doc.extend(set);
                    result.modified_count = 1;
                }
            }
        }
        Ok(result)
    }
}
