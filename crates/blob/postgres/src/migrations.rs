use sqlx::PgPool;

use crate::config::PostgresBlobConfig;

/// Create the blob file and chunk tables if they do not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresBlobConfig) -> Result<(), sqlx::Error> {
    let files_table = config.files_table();
    let chunks_table = config.chunks_table();

    let create_files = format!(
        "CREATE TABLE IF NOT EXISTS {files_table} (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            content_type TEXT NOT NULL,
            length BIGINT NOT NULL,
            chunk_size INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL,
            checksum TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )"
    );

    // Chunks are inserted before their file row exists, so no foreign key.
    let create_chunks = format!(
        "CREATE TABLE IF NOT EXISTS {chunks_table} (
            blob_id TEXT NOT NULL,
            n INTEGER NOT NULL,
            data BYTEA NOT NULL,
            PRIMARY KEY (blob_id, n)
        )"
    );

    sqlx::query(&create_files).execute(pool).await?;
    sqlx::query(&create_chunks).execute(pool).await?;

    Ok(())
}
