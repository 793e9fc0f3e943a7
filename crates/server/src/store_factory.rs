use std::sync::Arc;

use tracing::info;

use docvault_blob::BlobStore;
use docvault_blob_memory::MemoryBlobStore;
#[cfg(feature = "postgres")]
use docvault_blob_postgres::{PostgresBlobConfig, PostgresBlobStore};
use docvault_core::UserId;
use docvault_library::{
    DocumentLibrary, LibraryBuilder, MembershipDirectory, OpenDirectory, StaticFamilies,
};
use docvault_metadata::DocumentStore;
use docvault_metadata_memory::MemoryDocumentStore;
#[cfg(feature = "postgres")]
use docvault_metadata_postgres::{PostgresDocumentStore, PostgresMetadataConfig};

use crate::auth::{IdentityResolver, JwtIdentityResolver};
use crate::config::{
    AuthConfig, BlobConfig, DocvaultConfig, FamilyConfig, JWT_SECRET_ENV, MetadataConfig,
};
use crate::error::ServerError;

/// Construct the blob store named by `[blob] backend`.
pub async fn create_blob_store(config: &BlobConfig) -> Result<Arc<dyn BlobStore>, ServerError> {
    if config.chunk_size == 0 {
        return Err(ServerError::Config("[blob] chunk_size must be non-zero".into()));
    }
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryBlobStore::with_chunk_size(config.chunk_size))),
        #[cfg(feature = "postgres")]
        "postgres" => create_postgres_blobs(config).await,
        other => Err(ServerError::Config(format!(
            "unsupported blob backend: {other} (is the feature enabled?)"
        ))),
    }
}

#[cfg(feature = "postgres")]
async fn create_postgres_blobs(config: &BlobConfig) -> Result<Arc<dyn BlobStore>, ServerError> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| ServerError::Config("postgres backend requires 'url' in [blob]".into()))?;
    let pg_config = PostgresBlobConfig {
        url: url.to_owned(),
        pool_size: config.pool_size,
        chunk_size: config.chunk_size,
        table_prefix: config
            .table_prefix
            .clone()
            .unwrap_or_else(|| "docvault_".to_owned()),
        ..PostgresBlobConfig::default()
    };
    let store = PostgresBlobStore::new(pg_config)
        .await
        .map_err(|e| ServerError::Config(format!("postgres blob store: {e}")))?;
    Ok(Arc::new(store))
}

/// Construct the document store named by `[metadata] backend`.
pub async fn create_document_store(
    config: &MetadataConfig,
) -> Result<Arc<dyn DocumentStore>, ServerError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryDocumentStore::new())),
        #[cfg(feature = "postgres")]
        "postgres" => create_postgres_documents(config).await,
        other => Err(ServerError::Config(format!(
            "unsupported metadata backend: {other} (is the feature enabled?)"
        ))),
    }
}

#[cfg(feature = "postgres")]
async fn create_postgres_documents(
    config: &MetadataConfig,
) -> Result<Arc<dyn DocumentStore>, ServerError> {
    let url = config.url.as_deref().ok_or_else(|| {
        ServerError::Config("postgres backend requires 'url' in [metadata]".into())
    })?;
    let pg_config = PostgresMetadataConfig {
        url: url.to_owned(),
        pool_size: config.pool_size,
        table_prefix: config
            .table_prefix
            .clone()
            .unwrap_or_else(|| "docvault_".to_owned()),
        ..PostgresMetadataConfig::default()
    };
    let store = PostgresDocumentStore::new(pg_config)
        .await
        .map_err(|e| ServerError::Config(format!("postgres metadata store: {e}")))?;
    Ok(Arc::new(store))
}

/// Family directory from `[[families]]`; open when none are configured.
pub fn create_membership(families: &[FamilyConfig]) -> Arc<dyn MembershipDirectory> {
    if families.is_empty() {
        return Arc::new(OpenDirectory);
    }
    Arc::new(StaticFamilies::new(families.iter().map(|family| {
        family
            .members
            .iter()
            .map(|m| UserId::new(m.trim()))
            .collect::<Vec<_>>()
    })))
}

/// Token verifier for `[auth]`. A secret is mandatory.
pub fn create_identity_resolver(
    config: &AuthConfig,
) -> Result<Arc<dyn IdentityResolver>, ServerError> {
    let secret = config.jwt_secret().ok_or_else(|| {
        ServerError::Config(format!(
            "a token secret is required: set [auth] jwt_secret or {JWT_SECRET_ENV}"
        ))
    })?;
    Ok(Arc::new(JwtIdentityResolver::new(&secret)))
}

/// Wire stores, membership, and upload policy into a [`DocumentLibrary`].
pub async fn build_library(config: &DocvaultConfig) -> Result<DocumentLibrary, ServerError> {
    let blobs = create_blob_store(&config.blob).await?;
    info!(backend = %config.blob.backend, chunk_size = config.blob.chunk_size, "blob store initialized");

    let documents = create_document_store(&config.metadata).await?;
    info!(backend = %config.metadata.backend, "metadata store initialized");

    LibraryBuilder::new()
        .blobs(blobs)
        .documents(documents)
        .membership(create_membership(&config.families))
        .policy(config.uploads.clone())
        .build()
        .map_err(|e| ServerError::Config(e.to_string()))
}
