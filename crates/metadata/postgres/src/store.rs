use std::sync::Arc;

use async_trait::async_trait;
use chrono::SubsecRound;
use sqlx::PgPool;
use tracing::debug;

use docvault_core::{Document, DocumentFilter, DocumentId, ListScope};
use docvault_metadata::{DocumentStore, MetadataError};

use crate::config::PostgresMetadataConfig;
use crate::migrations;

fn backend(e: &sqlx::Error) -> MetadataError {
    MetadataError::Backend(e.to_string())
}

fn to_i64(value: u64) -> Result<i64, MetadataError> {
    i64::try_from(value).map_err(|_| MetadataError::Backend(format!("{value} out of range")))
}

fn decode(body: &str, version: i64) -> Result<Document, MetadataError> {
    let mut doc: Document =
        serde_json::from_str(body).map_err(|e| MetadataError::Serialization(e.to_string()))?;
    // The column is authoritative; the body copy is written alongside it.
    doc.version = u64::try_from(version)
        .map_err(|_| MetadataError::Serialization(format!("negative version {version}")))?;
    Ok(doc)
}

fn encode(doc: &Document) -> Result<String, MetadataError> {
    serde_json::to_string(doc).map_err(|e| MetadataError::Serialization(e.to_string()))
}

fn scope_clause(scope: ListScope) -> &'static str {
    match scope {
        ListScope::Owned => "owner_id = $1",
        ListScope::Shared => "owner_id <> $1 AND $1 = ANY(shared_ids)",
        ListScope::All => "(owner_id = $1 OR $1 = ANY(shared_ids))",
    }
}

/// PostgreSQL-backed implementation of [`DocumentStore`].
///
/// Each record is one row: the JSON body plus the columns listings filter
/// on. Compare-and-swap updates use `WHERE version = $expected`.
pub struct PostgresDocumentStore {
    pool: PgPool,
    config: Arc<PostgresMetadataConfig>,
}

impl PostgresDocumentStore {
    /// Connect, create the pool, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Connection`] if pool creation fails, or
    /// [`MetadataError::Backend`] if migrations fail.
    pub async fn new(config: PostgresMetadataConfig) -> Result<Self, MetadataError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| MetadataError::Connection(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Build a store on an existing pool. Runs migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Backend`] if migrations fail.
    pub async fn from_pool(
        pool: PgPool,
        config: PostgresMetadataConfig,
    ) -> Result<Self, MetadataError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| backend(&e))?;

        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }

    async fn current_version(&self, id: &DocumentId) -> Result<Option<i64>, MetadataError> {
        let table = self.config.documents_table();
        let row: Option<(i64,)> =
            sqlx::query_as(&format!("SELECT version FROM {table} WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| backend(&e))?;
        Ok(row.map(|(v,)| v))
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn insert(&self, doc: &Document) -> Result<(), MetadataError> {
        let table = self.config.documents_table();
        let query = format!(
            "INSERT INTO {table} \
             (id, owner_id, upload_date, folder, tags, shared_ids, version, body) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO NOTHING"
        );

        // TIMESTAMPTZ keeps microseconds; the body must sort the same way.
        let mut stored = doc.clone();
        stored.upload_date = stored.upload_date.trunc_subsecs(6);

        let tags: Vec<String> = stored.tags.iter().cloned().collect();
        let result = sqlx::query(&query)
            .bind(stored.id.as_str())
            .bind(stored.owner_id.as_str())
            .bind(stored.upload_date)
            .bind(stored.folder.as_deref())
            .bind(tags)
            .bind(stored.shared_member_ids())
            .bind(to_i64(stored.version)?)
            .bind(encode(&stored)?)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::AlreadyExists(doc.id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, MetadataError> {
        let table = self.config.documents_table();
        let row: Option<(String, i64)> =
            sqlx::query_as(&format!("SELECT body, version FROM {table} WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| backend(&e))?;
        row.map(|(body, version)| decode(&body, version)).transpose()
    }

    async fn update(
        &self,
        doc: &Document,
        expected_version: u64,
    ) -> Result<Document, MetadataError> {
        let table = self.config.documents_table();
        let mut stored = doc.clone();
        stored.version = expected_version + 1;
        stored.upload_date = stored.upload_date.trunc_subsecs(6);

        let query = format!(
            "UPDATE {table} SET \
             upload_date = $2, folder = $3, tags = $4, shared_ids = $5, version = $6, body = $7 \
             WHERE id = $1 AND version = $8"
        );
        let tags: Vec<String> = stored.tags.iter().cloned().collect();
        let result = sqlx::query(&query)
            .bind(stored.id.as_str())
            .bind(stored.upload_date)
            .bind(stored.folder.as_deref())
            .bind(tags)
            .bind(stored.shared_member_ids())
            .bind(to_i64(stored.version)?)
            .bind(encode(&stored)?)
            .bind(to_i64(expected_version)?)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        if result.rows_affected() == 1 {
            return Ok(stored);
        }

        match self.current_version(&doc.id).await? {
            None => Err(MetadataError::NotFound(doc.id.to_string())),
            Some(found) => {
                debug!(document_id = %doc.id, expected_version, found, "version conflict");
                Err(MetadataError::VersionConflict {
                    expected: expected_version,
                    found: u64::try_from(found).unwrap_or_default(),
                })
            }
        }
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), MetadataError> {
        let table = self.config.documents_table();
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list(&self, filter: &DocumentFilter) -> Result<Vec<Document>, MetadataError> {
        let table = self.config.documents_table();
        let scope = scope_clause(filter.scope);
        let query = format!(
            "SELECT body, version FROM {table} \
             WHERE {scope} \
             AND ($2::TEXT IS NULL OR $2 = ANY(tags)) \
             AND ($3::TEXT IS NULL OR folder = $3) \
             ORDER BY upload_date DESC, id COLLATE \"C\" DESC \
             LIMIT $4 OFFSET $5"
        );

        let limit = filter.limit.map(i64::try_from).transpose().map_err(|_| {
            MetadataError::Backend("limit out of range".into())
        })?;
        let offset = i64::try_from(filter.offset)
            .map_err(|_| MetadataError::Backend("offset out of range".into()))?;

        let rows: Vec<(String, i64)> = sqlx::query_as(&query)
            .bind(filter.requester.as_str())
            .bind(filter.tag.as_deref())
            .bind(filter.folder.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend(&e))?;

        rows.iter()
            .map(|(body, version)| decode(body, *version))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use docvault_core::UserId;
    use docvault_metadata::testing::sample_document;

    use super::*;

    #[test]
    fn column_version_wins_over_body() {
        let mut doc = sample_document(&UserId::new("owner"), 0);
        doc.version = 1;
        let body = encode(&doc).unwrap();
        let decoded = decode(&body, 7).unwrap();
        assert_eq!(decoded.version, 7);
        assert_eq!(decoded.id, doc.id);
    }

    #[test]
    fn corrupt_body_is_serialization_error() {
        assert!(matches!(
            decode("{not json", 1),
            Err(MetadataError::Serialization(_))
        ));
    }

    #[test]
    fn shared_scope_excludes_owner() {
        assert!(scope_clause(ListScope::Shared).contains("owner_id <> $1"));
        assert_eq!(scope_clause(ListScope::Owned), "owner_id = $1");
    }
}
