use bytes::Bytes;

use docvault_core::BlobId;

use crate::chunker::sha256_hex;
use crate::error::BlobError;
use crate::store::BlobStore;
use crate::types::{BlobInfo, BlobWriteRequest};

fn request(name: &str) -> BlobWriteRequest {
    BlobWriteRequest {
        filename: name.to_owned(),
        content_type: "application/pdf".to_owned(),
    }
}

/// Deterministic test payload of `len` bytes.
#[allow(clippy::cast_possible_truncation)]
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Write `data` to `store` in pieces of `piece` bytes and finalize it.
pub async fn write_all(
    store: &dyn BlobStore,
    name: &str,
    data: &[u8],
    piece: usize,
) -> Result<BlobInfo, BlobError> {
    let mut writer = store.open_write(request(name)).await?;
    for part in data.chunks(piece.max(1)) {
        writer.write(Bytes::copy_from_slice(part)).await?;
    }
    writer.finish().await
}

/// Run the full blob store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance
/// and the chunk size it was configured with.
///
/// # Errors
///
/// Returns an error if any storage call fails unexpectedly.
pub async fn run_store_conformance_tests(
    store: &dyn BlobStore,
    chunk_size: usize,
) -> Result<(), BlobError> {
    test_read_missing(store).await?;
    test_delete_missing(store).await?;
    test_small_round_trip(store).await?;
    test_multi_chunk_round_trip(store, chunk_size).await?;
    test_empty_blob(store).await?;
    test_abort_discards_chunks(store, chunk_size).await?;
    test_delete(store).await?;
    test_concurrent_readers(store, chunk_size).await?;
    test_distinct_ids(store).await?;
    Ok(())
}

async fn test_read_missing(store: &dyn BlobStore) -> Result<(), BlobError> {
    let missing = BlobId::new("missing-blob");
    let err = store.open_read(&missing).await.err();
    assert!(
        err.as_ref().is_some_and(BlobError::is_not_found),
        "open_read on unknown id should be NotFound, got {err:?}"
    );
    assert!(store.stat(&missing).await?.is_none());
    Ok(())
}

async fn test_delete_missing(store: &dyn BlobStore) -> Result<(), BlobError> {
    let err = store.delete(&BlobId::new("missing-blob")).await.err();
    assert!(
        err.as_ref().is_some_and(BlobError::is_not_found),
        "delete on unknown id should be NotFound, got {err:?}"
    );
    Ok(())
}

async fn test_small_round_trip(store: &dyn BlobStore) -> Result<(), BlobError> {
    let data = b"hello, family vault";
    let info = write_all(store, "hello.pdf", data, 5).await?;
    assert_eq!(info.length, data.len() as u64);
    assert_eq!(info.chunk_count, 1);
    assert_eq!(info.filename, "hello.pdf");
    assert_eq!(info.content_type, "application/pdf");

    let reader = store.open_read(&info.id).await?;
    assert_eq!(reader.info, info);
    assert_eq!(reader.into_bytes().await?.as_ref(), data);
    Ok(())
}

async fn test_multi_chunk_round_trip(
    store: &dyn BlobStore,
    chunk_size: usize,
) -> Result<(), BlobError> {
    let data = pattern(chunk_size * 2 + 17);
    // Pieces deliberately misaligned with the chunk size.
    let info = write_all(store, "big.pdf", &data, chunk_size / 3 + 1).await?;
    assert_eq!(info.length, data.len() as u64);
    assert_eq!(info.chunk_count, 3);
    assert_eq!(info.checksum_sha256, sha256_hex(&data));

    let stat = store.stat(&info.id).await?;
    assert_eq!(stat.as_ref(), Some(&info));

    let bytes = store.open_read(&info.id).await?.into_bytes().await?;
    assert_eq!(bytes.as_ref(), data.as_slice(), "bytes must round-trip in order");
    Ok(())
}

async fn test_empty_blob(store: &dyn BlobStore) -> Result<(), BlobError> {
    let info = write_all(store, "empty.pdf", &[], 1).await?;
    assert_eq!(info.length, 0);
    assert_eq!(info.chunk_count, 0);
    let bytes = store.open_read(&info.id).await?.into_bytes().await?;
    assert!(bytes.is_empty());
    Ok(())
}

async fn test_abort_discards_chunks(
    store: &dyn BlobStore,
    chunk_size: usize,
) -> Result<(), BlobError> {
    let mut writer = store.open_write(request("aborted.pdf")).await?;
    let id = writer.id().clone();
    writer
        .write(Bytes::from(pattern(chunk_size + chunk_size / 2)))
        .await?;
    writer.abort().await?;

    assert!(store.stat(&id).await?.is_none(), "aborted blob must not exist");
    let err = store.open_read(&id).await.err();
    assert!(err.as_ref().is_some_and(BlobError::is_not_found));
    Ok(())
}

async fn test_delete(store: &dyn BlobStore) -> Result<(), BlobError> {
    let info = write_all(store, "doomed.pdf", b"short lived", 4).await?;
    store.delete(&info.id).await?;

    let err = store.open_read(&info.id).await.err();
    assert!(err.as_ref().is_some_and(BlobError::is_not_found));
    let err = store.delete(&info.id).await.err();
    assert!(
        err.as_ref().is_some_and(BlobError::is_not_found),
        "second delete should be NotFound"
    );
    Ok(())
}

async fn test_concurrent_readers(
    store: &dyn BlobStore,
    chunk_size: usize,
) -> Result<(), BlobError> {
    let data = pattern(chunk_size * 3);
    let info = write_all(store, "shared.pdf", &data, chunk_size).await?;

    let first = store.open_read(&info.id).await?;
    let second = store.open_read(&info.id).await?;
    let (a, b) = futures::future::join(first.into_bytes(), second.into_bytes()).await;
    assert_eq!(a?.as_ref(), data.as_slice());
    assert_eq!(b?.as_ref(), data.as_slice());
    Ok(())
}

async fn test_distinct_ids(store: &dyn BlobStore) -> Result<(), BlobError> {
    let a = write_all(store, "same.pdf", b"same bytes", 10).await?;
    let b = write_all(store, "same.pdf", b"same bytes", 10).await?;
    assert_ne!(a.id, b.id, "every write must get a new blob id");
    assert_eq!(a.checksum_sha256, b.checksum_sha256);
    Ok(())
}
