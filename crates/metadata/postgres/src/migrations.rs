use sqlx::PgPool;

use crate::config::PostgresMetadataConfig;

/// Create the documents table and its listing indexes if they do not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(
    pool: &PgPool,
    config: &PostgresMetadataConfig,
) -> Result<(), sqlx::Error> {
    let table = config.documents_table();
    let prefix = &config.table_prefix;

    // `body` holds the full JSON record; the other columns exist for filtering.
    let create_documents = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            upload_date TIMESTAMPTZ NOT NULL,
            folder TEXT,
            tags TEXT[] NOT NULL DEFAULT '{{}}',
            shared_ids TEXT[] NOT NULL DEFAULT '{{}}',
            version BIGINT NOT NULL,
            body TEXT NOT NULL
        )"
    );

    let create_owner_idx = format!(
        "CREATE INDEX IF NOT EXISTS {prefix}documents_owner_idx \
         ON {table} (owner_id, upload_date DESC)"
    );

    let create_shared_idx = format!(
        "CREATE INDEX IF NOT EXISTS {prefix}documents_shared_idx \
         ON {table} USING GIN (shared_ids)"
    );

    sqlx::query(&create_documents).execute(pool).await?;
    sqlx::query(&create_owner_idx).execute(pool).await?;
    sqlx::query(&create_shared_idx).execute(pool).await?;

    Ok(())
}
