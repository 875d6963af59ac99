//! Postgres-backed document store.
//!
//! Every collection lives in one `documents` table as JSONB bodies.
//! Equality filters map to JSONB containment (`body @> filter`).
//! Queries are runtime-checked so no live DB is needed at compile time.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{Collection, DocumentStore, Filter};
use crate::types::{Document, InsertOneResult, UpdateResult};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the schema. Idempotent; safe on every startup.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let row: Option<Json<Document>> = sqlx::query_scalar(
            r#"
            SELECT body FROM documents
            WHERE collection = $1 AND body @> $2
            ORDER BY created_at, seq
            LIMIT 1
            "#,
        )
        .bind(collection.as_str())
        .bind(Json(filter.as_document()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(doc)| doc))
    }

    async fn insert_one(
        &self,
        collection: Collection,
        mut doc: Document,
    ) -> Result<InsertOneResult, StoreError> {
        let id = Uuid::new_v4();
        doc.insert("_id".into(), Value::String(id.to_string()));

        sqlx::query(
            r#"
            INSERT INTO documents (id, collection, body)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id)
        .bind(collection.as_str())
        .bind(Json(&doc))
        .execute(&self.pool)
        .await?;

        Ok(InsertOneResult {
            acknowledged: true,
            inserted_id: id.to_string(),
        })
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        set: Document,
    ) -> Result<UpdateResult, StoreError> {
        let (matched, modified): (i64, i64) = sqlx::query_as(
            r#"
            WITH target AS (
                SELECT id, body @> $3 AS unchanged
                FROM documents
                WHERE collection = $1 AND body @> $2
                ORDER BY created_at, seq
                LIMIT 1
                FOR UPDATE
            ), updated AS (
                UPDATE documents d SET body = d.body || $3
                FROM target
                WHERE d.id = target.id AND NOT target.unchanged
                RETURNING d.id
            )
            SELECT (SELECT COUNT(*) FROM target), (SELECT COUNT(*) FROM updated)
            "#,
        )
        .bind(collection.as_str())
        .bind(Json(filter.as_document()))
        .bind(Json(&set))
        .fetch_one(&self.pool)
        .await?;

        Ok(UpdateResult {
            acknowledged: true,
            matched_count: matched as u64,
            modified_count: modified as u64,
        })
    }
}
