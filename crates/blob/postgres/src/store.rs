use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, warn};

use docvault_blob::{
    BlobError, BlobInfo, BlobReader, BlobStore, BlobWriteRequest, BlobWriter, Chunk, Chunker,
};
use docvault_core::BlobId;

use crate::config::PostgresBlobConfig;
use crate::migrations;

type FileRow = (String, String, String, i64, i32, i32, String, DateTime<Utc>);

fn backend(e: &sqlx::Error) -> BlobError {
    BlobError::Storage(e.to_string())
}

fn to_i32(value: impl TryInto<i32>, what: &str) -> Result<i32, BlobError> {
    value
        .try_into()
        .map_err(|_| BlobError::Storage(format!("{what} out of range")))
}

fn file_row_to_info(row: FileRow) -> Result<BlobInfo, BlobError> {
    let (id, filename, content_type, length, chunk_size, chunk_count, checksum, created_at) = row;
    let corrupted = |field: &str| BlobError::Corrupted(format!("{id}: negative {field}"));
    Ok(BlobInfo {
        length: u64::try_from(length).map_err(|_| corrupted("length"))?,
        chunk_size: u32::try_from(chunk_size).map_err(|_| corrupted("chunk size"))?,
        chunk_count: u32::try_from(chunk_count).map_err(|_| corrupted("chunk count"))?,
        id: BlobId::new(id),
        filename,
        content_type,
        checksum_sha256: checksum,
        created_at,
    })
}

/// PostgreSQL-backed implementation of [`BlobStore`].
///
/// Content is split into fixed-size `BYTEA` chunk rows keyed by
/// `(blob_id, n)`. A blob becomes readable only once its row in the file
/// table is inserted by [`BlobWriter::finish`].
pub struct PostgresBlobStore {
    pool: PgPool,
    config: Arc<PostgresBlobConfig>,
}

impl PostgresBlobStore {
    /// Connect, create the pool, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Storage`] if the pool cannot be created or
    /// migrations fail.
    pub async fn new(config: PostgresBlobConfig) -> Result<Self, BlobError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| BlobError::Storage(format!("connection failed: {e}")))?;

        Self::from_pool(pool, config).await
    }

    /// Build a store on an existing pool. Runs migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Storage`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: PostgresBlobConfig) -> Result<Self, BlobError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| backend(&e))?;

        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }

    async fn fetch_info(&self, id: &BlobId) -> Result<Option<BlobInfo>, BlobError> {
        let table = self.config.files_table();
        let query = format!(
            "SELECT id, filename, content_type, length, chunk_size, chunk_count, checksum, created_at \
             FROM {table} WHERE id = $1"
        );
        let row: Option<FileRow> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend(&e))?;
        row.map(file_row_to_info).transpose()
    }
}

#[async_trait]
impl BlobStore for PostgresBlobStore {
    async fn open_write(
        &self,
        request: BlobWriteRequest,
    ) -> Result<Box<dyn BlobWriter>, BlobError> {
        Ok(Box::new(PostgresBlobWriter {
            id: BlobId::generate(),
            request,
            chunker: Chunker::new(self.config.chunk_size),
            pool: self.pool.clone(),
            config: Arc::clone(&self.config),
        }))
    }

    async fn open_read(&self, id: &BlobId) -> Result<BlobReader, BlobError> {
        let info = self
            .fetch_info(id)
            .await?
            .ok_or_else(|| BlobError::NotFound(id.to_string()))?;

        let table = self.config.chunks_table();
        let query = format!("SELECT data FROM {table} WHERE blob_id = $1 AND n = $2");
        let pool = self.pool.clone();
        let blob_id = id.clone();
        let count = info.chunk_count;

        let stream = futures::stream::try_unfold(0_u32, move |n| {
            let pool = pool.clone();
            let query = query.clone();
            let blob_id = blob_id.clone();
            async move {
                if n >= count {
                    return Ok(None);
                }
                let row: Option<(Vec<u8>,)> = sqlx::query_as(&query)
                    .bind(blob_id.as_str())
                    .bind(to_i32(n, "chunk index")?)
                    .fetch_optional(&pool)
                    .await
                    .map_err(|e| backend(&e))?;
                match row {
                    Some((data,)) => Ok(Some((Bytes::from(data), n + 1))),
                    None => Err(BlobError::Corrupted(format!("{blob_id}: chunk {n} missing"))),
                }
            }
        })
        .boxed();

        Ok(BlobReader { info, stream })
    }

    async fn stat(&self, id: &BlobId) -> Result<Option<BlobInfo>, BlobError> {
        self.fetch_info(id).await
    }

    async fn delete(&self, id: &BlobId) -> Result<(), BlobError> {
        let files_table = self.config.files_table();
        let chunks_table = self.config.chunks_table();

        let mut tx = self.pool.begin().await.map_err(|e| backend(&e))?;
        let removed = sqlx::query(&format!("DELETE FROM {files_table} WHERE id = $1"))
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| backend(&e))?
            .rows_affected();
        // Also sweeps stray chunks of a write that never finished.
        let chunks = sqlx::query(&format!("DELETE FROM {chunks_table} WHERE blob_id = $1"))
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| backend(&e))?
            .rows_affected();
        tx.commit().await.map_err(|e| backend(&e))?;

        if removed == 0 {
            if chunks > 0 {
                warn!(blob_id = %id, chunks, "removed stray chunks of unfinished blob");
            }
            return Err(BlobError::NotFound(id.to_string()));
        }
        debug!(blob_id = %id, chunks, "blob deleted");
        Ok(())
    }
}

/// Writer half of [`PostgresBlobStore`]. Each full chunk is inserted as
/// soon as it is available.
pub struct PostgresBlobWriter {
    id: BlobId,
    request: BlobWriteRequest,
    chunker: Chunker,
    pool: PgPool,
    config: Arc<PostgresBlobConfig>,
}

async fn insert_chunk(
    pool: &PgPool,
    table: &str,
    id: &BlobId,
    chunk: Chunk,
) -> Result<(), BlobError> {
    sqlx::query(&format!(
        "INSERT INTO {table} (blob_id, n, data) VALUES ($1, $2, $3)"
    ))
    .bind(id.as_str())
    .bind(to_i32(chunk.index, "chunk index")?)
    .bind(chunk.data.as_ref())
    .execute(pool)
    .await
    .map_err(|e| backend(&e))?;
    Ok(())
}

#[async_trait]
impl BlobWriter for PostgresBlobWriter {
    fn id(&self) -> &BlobId {
        &self.id
    }

    async fn write(&mut self, data: Bytes) -> Result<(), BlobError> {
        let table = self.config.chunks_table();
        for chunk in self.chunker.push(&data) {
            insert_chunk(&self.pool, &table, &self.id, chunk).await?;
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<BlobInfo, BlobError> {
        let Self {
            id,
            request,
            chunker,
            pool,
            config,
        } = *self;

        let (tail, summary) = chunker.finish();
        if let Some(chunk) = tail {
            insert_chunk(&pool, &config.chunks_table(), &id, chunk).await?;
        }

        let info = BlobInfo {
            id,
            filename: request.filename,
            content_type: request.content_type,
            length: summary.length,
            chunk_size: u32::try_from(config.chunk_size)
                .map_err(|_| BlobError::Storage("chunk size out of range".into()))?,
            chunk_count: summary.chunk_count,
            checksum_sha256: summary.checksum_sha256,
            // TIMESTAMPTZ keeps microseconds.
            created_at: Utc::now().trunc_subsecs(6),
        };

        let table = config.files_table();
        sqlx::query(&format!(
            "INSERT INTO {table} \
             (id, filename, content_type, length, chunk_size, chunk_count, checksum, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(info.id.as_str())
        .bind(&info.filename)
        .bind(&info.content_type)
        .bind(i64::try_from(info.length).map_err(|_| BlobError::Storage("length out of range".into()))?)
        .bind(to_i32(info.chunk_size, "chunk size")?)
        .bind(to_i32(info.chunk_count, "chunk count")?)
        .bind(&info.checksum_sha256)
        .bind(info.created_at)
        .execute(&pool)
        .await
        .map_err(|e| backend(&e))?;

        Ok(info)
    }

    async fn abort(self: Box<Self>) -> Result<(), BlobError> {
        let table = self.config.chunks_table();
        let removed = sqlx::query(&format!("DELETE FROM {table} WHERE blob_id = $1"))
            .bind(self.id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| backend(&e))?
            .rows_affected();
        debug!(blob_id = %self.id, chunks = removed, "blob write aborted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_columns_are_corruption() {
        let row: FileRow = (
            "b1".into(),
            "a.pdf".into(),
            "application/pdf".into(),
            -1,
            16,
            1,
            "00".into(),
            Utc::now(),
        );
        assert!(matches!(file_row_to_info(row), Err(BlobError::Corrupted(_))));
    }

    #[test]
    fn file_row_maps_to_info() {
        let now = Utc::now();
        let row: FileRow = (
            "b1".into(),
            "a.pdf".into(),
            "application/pdf".into(),
            40,
            16,
            3,
            "abc".into(),
            now,
        );
        let info = file_row_to_info(row).unwrap();
        assert_eq!(info.id, BlobId::new("b1"));
        assert_eq!(info.length, 40);
        assert_eq!(info.chunk_count, 3);
        assert_eq!(info.created_at, now);
    }
}
