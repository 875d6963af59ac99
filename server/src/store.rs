//! Document store capability.
//!
//! Handlers never talk to a database directly: they receive an
//! `Arc<dyn DocumentStore>` at construction. `db::PgStore` backs it in
//! production, `memory::MemoryStore` in tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::types::{Document, InsertOneResult, UpdateResult, UserRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Restaurants,
    Orders,
    Locations,
    Messages,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Restaurants => "restaurants",
            Self::Orders => "orders",
            Self::Locations => "locations",
            Self::Messages => "messages",
        }
    }
}

/// Conjunction of top-level field equalities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Document);

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::default().and(field, value)
    }

    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.0.iter().all(|(k, v)| doc.get(k) == Some(v))
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document in `collection` matching `filter`, in insertion order.
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError>;

    /// Append a document. The store assigns `_id`.
    async fn insert_one(
        &self,
        collection: Collection,
        doc: Document,
    ) -> Result<InsertOneResult, StoreError>;

    /// Merge `set` into the first document matching `filter`.
    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        set: Document,
    ) -> Result<UpdateResult, StoreError>;
}

/// Look up a user by email. Always a fresh read.
pub async fn find_user(
    store: &dyn DocumentStore,
    email: &str,
) -> Result<Option<UserRecord>, StoreError> {
    let doc = store.find_one(Collection::Users, &Filter::eq("email", email)).await?;
    Ok(doc.as_ref().map(UserRecord::from_document))
}

/// Serialize a record into a document for `insert_one`.
pub fn to_document<T: serde::Serialize>(record: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialize(serde::ser::Error::custom(format!(
            "expected an object document, got {other}"
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_all_fields() {
        let doc = json!({"email": "a@x.com", "role": "admin", "isBlock": false});
        let doc = doc.as_object().unwrap();

        assert!(Filter::eq("email", "a@x.com").matches(doc));
        assert!(Filter::eq("email", "a@x.com").and("role", "admin").matches(doc));
        assert!(!Filter::eq("email", "a@x.com").and("isBlock", true).matches(doc));
        assert!(!Filter::eq("missing", "x").matches(doc));
        assert!(Filter::default().matches(doc));
    }
}
