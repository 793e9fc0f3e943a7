
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Timelike;
use futures::stream::{self, Stream, StreamExt};

use docvault_blob::{BlobStore, sha256_hex};
use docvault_blob::testing::pattern;
use docvault_core::{AccessLevel, DocumentId, ListScope, UploadPolicy, UserId};

use self::faults::{FaultyBlobStore, FaultyDocumentStore};
use crate::{
    DocumentDraft, DocumentLibrary, FileDescriptor, LibraryBuilder, LibraryError, ListQuery,
    MetadataPatch, StaticFamilies,
};

const CHUNK: usize = 16;

struct Harness {
    library: DocumentLibrary,
    blobs: Arc<FaultyBlobStore>,
    docs: Arc<FaultyDocumentStore>,
}

fn harness_with(policy: UploadPolicy) -> Harness {
    let blobs = Arc::new(FaultyBlobStore::new(CHUNK));
    let docs = Arc::new(FaultyDocumentStore::default());
    let library = LibraryBuilder::new()
        .blobs(Arc::clone(&blobs) as _)
        .documents(Arc::clone(&docs) as _)
        .membership(Arc::new(StaticFamilies::new([vec![
            UserId::new("alice"),
            UserId::new("bob"),
            UserId::new("carol"),
        ]])))
        .policy(policy)
        .build()
        .unwrap();
    Harness {
        library,
        blobs,
        docs,
    }
}

fn harness() -> Harness {
    harness_with(UploadPolicy::default())
}

fn alice() -> UserId {
    UserId::new("alice")
}

fn bob() -> UserId {
    UserId::new("bob")
}

fn carol() -> UserId {
    UserId::new("carol")
}

fn mallory() -> UserId {
    UserId::new("mallory")
}

fn pdf(name: &str) -> FileDescriptor {
    FileDescriptor {
        filename: name.into(),
        content_type: "application/pdf".into(),
        declared_size: None,
    }
}

/// Split `data` into transport-sized pieces.
fn body(data: &[u8], piece: usize) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + Unpin {
    let pieces: Vec<Result<Bytes, Infallible>> = data
        .chunks(piece)
        .map(|p| Ok(Bytes::copy_from_slice(p)))
        .collect();
    stream::iter(pieces)
}

async fn upload(h: &Harness, owner: &UserId, name: &str, data: &[u8]) -> docvault_core::Document {
    h.library
        .upload(owner, pdf(name), DocumentDraft::default(), body(data, 7))
        .await
        .unwrap()
}

async fn read_all(h: &Harness, requester: &UserId, id: &DocumentId) -> Result<Vec<u8>, LibraryError> {
    let download = h.library.view(requester, id).await?;
    let reader = docvault_blob::BlobReader {
        info: download.info,
        stream: download.stream,
    };
    reader
        .into_bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| LibraryError::Storage(e.to_string()))
}

#[tokio::test]
async fn upload_then_view_round_trips_bytes() {
    let h = harness();
    let data = pattern(CHUNK * 5 + 3);
    let doc = upload(&h, &alice(), "report.pdf", &data).await;

    assert_eq!(doc.file_size, data.len() as u64);
    assert_eq!(doc.version, 1);
    assert_eq!(doc.filename, "report.pdf");
    assert_eq!(doc.original_name, "report.pdf");
    assert_eq!(read_all(&h, &alice(), &doc.id).await.unwrap(), data);

    let info = h.blobs.inner.stat(&doc.blob_id).await.unwrap().unwrap();
    assert_eq!(info.length, doc.file_size);
    assert_eq!(h.library.metrics().snapshot().uploads, 1);
}

#[tokio::test]
async fn draft_fields_are_normalized() {
    let h = harness();
    let draft = DocumentDraft {
        filename: Some("  Car Insurance.pdf ".into()),
        tags: vec!["car".into(), " insurance ".into(), "car".into()],
        description: Some("   ".into()),
        folder: Some(" vehicles ".into()),
        expiry_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 1),
        reminder_enabled: true,
        shared_with: vec![bob(), bob()],
    };
    let doc = h
        .library
        .upload(&alice(), pdf("scan.pdf"), draft, body(b"%PDF-1.7", 4))
        .await
        .unwrap();

    assert_eq!(doc.filename, "Car Insurance.pdf");
    assert_eq!(doc.original_name, "scan.pdf");
    assert_eq!(doc.tags.len(), 2);
    assert_eq!(doc.description, None);
    assert_eq!(doc.folder.as_deref(), Some("vehicles"));
    assert!(doc.reminder_enabled);
    assert_eq!(doc.shared_with.len(), 1);
    assert_eq!(doc.shared_with[0].access, AccessLevel::View);
}

#[tokio::test]
async fn invalid_draft_fails_before_any_write() {
    let h = harness();
    let draft = DocumentDraft {
        shared_with: vec![mallory()],
        ..DocumentDraft::default()
    };
    let err = h
        .library
        .upload(&alice(), pdf("a.pdf"), draft, body(b"data", 4))
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::InvalidInput(_)), "{err:?}");
    assert_eq!(h.blobs.inner.chunk_count(), 0);
    assert_eq!(h.blobs.inner.blob_count(), 0);
}

#[tokio::test]
async fn failed_blob_write_leaves_no_record_and_no_chunks() {
    let h = harness();
    h.blobs.fail_write_at(3);
    let err = h
        .library
        .upload(&alice(), pdf("a.pdf"), DocumentDraft::default(), body(&pattern(200), 10))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::UploadFailed(_)), "{err:?}");
    assert!(h.docs.inner.is_empty());
    assert_eq!(h.blobs.inner.blob_count(), 0);
    assert_eq!(h.blobs.inner.chunk_count(), 0, "partial chunks must be removed");
    assert_eq!(h.library.metrics().snapshot().upload_failures, 1);
}

#[tokio::test]
async fn failed_metadata_insert_deletes_the_blob() {
    let h = harness();
    h.docs.fail_inserts(true);
    let err = h
        .library
        .upload(&alice(), pdf("a.pdf"), DocumentDraft::default(), body(&pattern(40), 8))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::UploadFailed(_)), "{err:?}");
    assert_eq!(h.blobs.inner.blob_count(), 0, "orphan blob must be compensated");
    assert_eq!(h.blobs.inner.chunk_count(), 0);
    let snap = h.library.metrics().snapshot();
    assert_eq!(snap.compensations, 1);
    assert_eq!(snap.uploads, 0);
}

#[tokio::test]
async fn transport_error_aborts_write() {
    let h = harness();
    let pieces: Vec<Result<Bytes, String>> = vec![
        Ok(Bytes::from(pattern(CHUNK * 2))),
        Err("connection reset".to_owned()),
    ];
    let err = h
        .library
        .upload(&alice(), pdf("a.pdf"), DocumentDraft::default(), stream::iter(pieces))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::UploadFailed(_)), "{err:?}");
    assert_eq!(h.blobs.inner.chunk_count(), 0);
    assert!(h.docs.inner.is_empty());
}

#[tokio::test]
async fn disallowed_type_writes_nothing() {
    let h = harness();
    let data = b"PK\x03\x04 zipped";
    let file = FileDescriptor {
        filename: "archive.zip".into(),
        content_type: "application/zip".into(),
        declared_size: Some(data.len() as u64),
    };
    let err = h
        .library
        .upload(&alice(), file, DocumentDraft::default(), body(data, 4))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::InvalidInput(_)), "{err:?}");
    assert!(err.to_string().contains("application/pdf"), "lists allowed types");
    assert!(!h.blobs.inner.contains_checksum(&sha256_hex(data)));
    assert_eq!(h.blobs.inner.chunk_count(), 0);
}

#[tokio::test]
async fn declared_oversize_is_rejected_before_any_chunk() {
    let h = harness();
    let file = FileDescriptor {
        declared_size: Some(11 * 1024 * 1024),
        ..pdf("huge.pdf")
    };
    let err = h
        .library
        .upload(&alice(), file, DocumentDraft::default(), body(&pattern(64), 16))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::InvalidInput(_)), "{err:?}");
    assert!(err.to_string().contains("10485760"), "states the limit: {err}");
    assert_eq!(h.blobs.inner.chunk_count(), 0);
}

#[tokio::test]
async fn undeclared_oversize_stream_is_cut_off() {
    let h = harness_with(UploadPolicy {
        max_file_size: 40,
        ..UploadPolicy::default()
    });
    let err = h
        .library
        .upload(&alice(), pdf("big.pdf"), DocumentDraft::default(), body(&pattern(100), 10))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::InvalidInput(_)), "{err:?}");
    assert_eq!(h.blobs.inner.chunk_count(), 0);
    assert_eq!(h.blobs.inner.blob_count(), 0);
    assert_eq!(h.library.metrics().snapshot().upload_failures, 0);
}

#[tokio::test]
async fn empty_file_is_rejected() {
    let h = harness();
    let err = h
        .library
        .upload(&alice(), pdf("empty.pdf"), DocumentDraft::default(), body(&[], 1))
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::InvalidInput(_)), "{err:?}");
    assert_eq!(h.blobs.inner.blob_count(), 0);
}

#[tokio::test]
async fn stage_then_discard_removes_blob() {
    let h = harness();
    let staged = h
        .library
        .stage(&alice(), pdf("a.pdf"), body(&pattern(50), 9))
        .await
        .unwrap();
    assert_eq!(staged.file_size(), 50);
    assert_eq!(staged.checksum_sha256(), sha256_hex(&pattern(50)));
    assert_eq!(h.blobs.inner.blob_count(), 1);

    h.library.discard(staged).await.unwrap();
    assert_eq!(h.blobs.inner.blob_count(), 0);
    assert!(h.docs.inner.is_empty());
}

#[tokio::test]
async fn commit_with_invalid_draft_compensates() {
    let h = harness();
    let staged = h
        .library
        .stage(&alice(), pdf("a.pdf"), body(&pattern(20), 5))
        .await
        .unwrap();
    let draft = DocumentDraft {
        tags: vec!["x".repeat(65)],
        ..DocumentDraft::default()
    };
    let err = h.library.commit_upload(staged, draft).await.unwrap_err();

    assert!(matches!(err, LibraryError::InvalidInput(_)), "{err:?}");
    assert_eq!(h.blobs.inner.blob_count(), 0);
    assert!(h.docs.inner.is_empty());
}

/// Let background cleanup tasks run until `done` holds.
async fn settle(done: impl Fn() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn check_draft_rejects_without_storing() {
    let h = harness();
    let long_tag = DocumentDraft {
        tags: vec!["x".repeat(65)],
        ..DocumentDraft::default()
    };
    let stranger = DocumentDraft {
        shared_with: vec![mallory()],
        ..DocumentDraft::default()
    };
    let fine = DocumentDraft {
        tags: vec!["tax".into()],
        shared_with: vec![bob()],
        ..DocumentDraft::default()
    };

    for draft in [&long_tag, &stranger] {
        let err = h.library.check_draft(&alice(), draft).await.unwrap_err();
        assert!(matches!(err, LibraryError::InvalidInput(_)), "{err:?}");
    }
    h.library.check_draft(&alice(), &fine).await.unwrap();

    assert_eq!(h.blobs.inner.chunk_count(), 0);
    assert_eq!(h.library.metrics().snapshot().compensations, 0);
}

#[tokio::test]
async fn cancelled_stage_removes_partial_chunks() {
    let h = harness();
    let stalled = stream::iter(vec![Ok::<_, Infallible>(Bytes::from(pattern(48)))])
        .chain(stream::pending());

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        h.library.stage(&alice(), pdf("a.pdf"), stalled),
    )
    .await;
    assert!(outcome.is_err(), "stage should still be waiting for bytes");

    settle(|| h.blobs.inner.chunk_count() == 0).await;
    assert_eq!(h.blobs.inner.chunk_count(), 0);
    assert_eq!(h.blobs.inner.blob_count(), 0);
    assert_eq!(h.library.metrics().snapshot().compensations, 1);
}

#[tokio::test]
async fn dropped_staged_upload_is_deleted() {
    let h = harness();
    let staged = h
        .library
        .stage(&alice(), pdf("a.pdf"), body(&pattern(40), 8))
        .await
        .unwrap();
    assert_eq!(h.blobs.inner.blob_count(), 1);

    drop(staged);
    settle(|| h.blobs.inner.blob_count() == 0).await;
    assert_eq!(h.blobs.inner.blob_count(), 0);
    assert_eq!(h.blobs.inner.chunk_count(), 0);
    assert!(h.docs.inner.is_empty());
}

#[tokio::test]
async fn committed_upload_keeps_its_blob() {
    let h = harness();
    let doc = upload(&h, &alice(), "a.pdf", &pattern(40)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.blobs.inner.blob_count(), 1);
    assert_eq!(read_all(&h, &alice(), &doc.id).await.unwrap(), pattern(40));
    assert_eq!(h.library.metrics().snapshot().compensations, 0);
}

#[tokio::test]
async fn upload_dates_are_whole_microseconds() {
    let h = harness();
    let doc = upload(&h, &alice(), "a.pdf", &pattern(10)).await;
    assert_eq!(doc.upload_date.nanosecond() % 1_000, 0);

    let replaced = h
        .library
        .replace(&alice(), &doc.id, pdf("b.pdf"), body(&pattern(12), 4))
        .await
        .unwrap();
    assert_eq!(replaced.upload_date.nanosecond() % 1_000, 0);
}

#[tokio::test]
async fn replace_swaps_content_and_keeps_classification() {
    let h = harness();
    let draft = DocumentDraft {
        tags: vec!["medical".into()],
        description: Some("Lab results".into()),
        folder: Some("health".into()),
        shared_with: vec![bob()],
        ..DocumentDraft::default()
    };
    let original = h
        .library
        .upload(&alice(), pdf("labs.pdf"), draft, body(&pattern(30), 7))
        .await
        .unwrap();

    let new_data = pattern(CHUNK * 3 + 1);
    let file = FileDescriptor {
        filename: "labs-rescan.png".into(),
        content_type: "image/png".into(),
        declared_size: Some(new_data.len() as u64),
    };
    let replaced = h
        .library
        .replace(&alice(), &original.id, file, body(&new_data, 11))
        .await
        .unwrap();

    assert_ne!(replaced.blob_id, original.blob_id);
    assert_eq!(replaced.file_size, new_data.len() as u64);
    assert_eq!(replaced.mime_type, "image/png");
    assert_eq!(replaced.original_name, "labs-rescan.png");
    assert!(replaced.upload_date >= original.upload_date);
    assert_eq!(replaced.version, original.version + 1);

    assert_eq!(replaced.tags, original.tags);
    assert_eq!(replaced.description, original.description);
    assert_eq!(replaced.shared_with, original.shared_with);
    assert_eq!(replaced.folder, original.folder);
    assert_eq!(replaced.filename, original.filename);

    let old = h.blobs.inner.open_read(&original.blob_id).await.err();
    assert!(old.is_some_and(|e| e.is_not_found()), "old blob must be gone");
    assert_eq!(h.blobs.inner.blob_count(), 1);
    assert_eq!(read_all(&h, &alice(), &original.id).await.unwrap(), new_data);
}

#[tokio::test]
async fn failed_replace_write_leaves_document_untouched() {
    let h = harness();
    let data = pattern(25);
    let original = upload(&h, &alice(), "a.pdf", &data).await;

    h.blobs.fail_write_at(1);
    let err = h
        .library
        .replace(&alice(), &original.id, pdf("b.pdf"), body(&pattern(80), 10))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::ReplaceFailed(_)), "{err:?}");
    let current = h.library.get(&alice(), &original.id).await.unwrap();
    assert_eq!(current, original);
    assert_eq!(read_all(&h, &alice(), &original.id).await.unwrap(), data);
    assert_eq!(h.blobs.inner.blob_count(), 1);
}

#[tokio::test]
async fn failed_replace_commit_removes_new_blob() {
    let h = harness();
    let data = pattern(25);
    let original = upload(&h, &alice(), "a.pdf", &data).await;

    h.docs.fail_updates(true);
    let err = h
        .library
        .replace(&alice(), &original.id, pdf("b.pdf"), body(&pattern(60), 10))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::ReplaceFailed(_)), "{err:?}");
    assert_eq!(h.blobs.inner.blob_count(), 1, "only the original blob remains");
    assert_eq!(read_all(&h, &alice(), &original.id).await.unwrap(), data);
    assert_eq!(h.library.metrics().snapshot().compensations, 1);
}

#[tokio::test]
async fn concurrent_change_during_replace_is_a_conflict() {
    let h = harness();
    let data = pattern(25);
    let original = upload(&h, &alice(), "a.pdf", &data).await;

    h.docs.race_next_update();
    let err = h
        .library
        .replace(&alice(), &original.id, pdf("b.pdf"), body(&pattern(60), 10))
        .await
        .unwrap_err();

    assert!(matches!(err, LibraryError::Conflict(_)), "{err:?}");
    assert_eq!(h.blobs.inner.blob_count(), 1);
    let current = h.library.get(&alice(), &original.id).await.unwrap();
    assert_eq!(current.blob_id, original.blob_id);
    assert_eq!(current.description.as_deref(), Some("concurrent edit"));
    assert_eq!(h.library.metrics().snapshot().conflicts, 1);
}

#[tokio::test]
async fn authorization_by_role() {
    let h = harness();
    let doc = upload(&h, &alice(), "a.pdf", b"secret").await;
    h.library
        .share(&alice(), &doc.id, bob(), AccessLevel::View)
        .await
        .unwrap();

    // Strangers get nothing.
    let err = h.library.view(&mallory(), &doc.id).await.unwrap_err();
    assert!(matches!(err, LibraryError::Forbidden(_)));
    let err = h
        .library
        .update_metadata(&mallory(), &doc.id, MetadataPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Forbidden(_)));
    let err = h.library.delete(&mallory(), &doc.id).await.unwrap_err();
    assert!(matches!(err, LibraryError::Forbidden(_)));

    // A view member reads but cannot change anything.
    assert_eq!(read_all(&h, &bob(), &doc.id).await.unwrap(), b"secret");
    let patch = MetadataPatch {
        filename: Some("mine.pdf".into()),
        ..MetadataPatch::default()
    };
    let err = h
        .library
        .update_metadata(&bob(), &doc.id, patch.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Forbidden(_)));
    let err = h
        .library
        .replace(&bob(), &doc.id, pdf("x.pdf"), body(b"x", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Forbidden(_)));
    let err = h.library.delete(&bob(), &doc.id).await.unwrap_err();
    assert!(matches!(err, LibraryError::Forbidden(_)));

    // An edit member may edit but not delete or reshare.
    h.library
        .share(&alice(), &doc.id, bob(), AccessLevel::Edit)
        .await
        .unwrap();
    let updated = h.library.update_metadata(&bob(), &doc.id, patch).await.unwrap();
    assert_eq!(updated.filename, "mine.pdf");
    let err = h.library.delete(&bob(), &doc.id).await.unwrap_err();
    assert!(matches!(err, LibraryError::Forbidden(_)));
    let err = h
        .library
        .share(&bob(), &doc.id, carol(), AccessLevel::View)
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Forbidden(_)));
}

#[tokio::test]
async fn delete_then_view_is_not_found() {
    let h = harness();
    let doc = upload(&h, &alice(), "a.pdf", &pattern(40)).await;
    h.library.delete(&alice(), &doc.id).await.unwrap();

    let err = h.library.view(&alice(), &doc.id).await.unwrap_err();
    assert!(matches!(err, LibraryError::NotFound(_)));
    assert_eq!(h.blobs.inner.blob_count(), 0);
    assert_eq!(h.blobs.inner.chunk_count(), 0);
    assert!(h.docs.inner.is_empty());
    assert_eq!(h.library.metrics().snapshot().deletes, 1);
}

#[tokio::test]
async fn failed_blob_delete_keeps_document_intact() {
    let h = harness();
    let data = pattern(40);
    let doc = upload(&h, &alice(), "a.pdf", &data).await;

    h.blobs.fail_deletes(true);
    let err = h.library.delete(&alice(), &doc.id).await.unwrap_err();
    assert!(matches!(err, LibraryError::Storage(_)), "{err:?}");
    assert_eq!(read_all(&h, &alice(), &doc.id).await.unwrap(), data);

    h.blobs.fail_deletes(false);
    h.library.delete(&alice(), &doc.id).await.unwrap();
}

#[tokio::test]
async fn delete_tolerates_missing_blob() {
    let h = harness();
    let doc = upload(&h, &alice(), "a.pdf", &pattern(40)).await;
    h.blobs.inner.delete(&doc.blob_id).await.unwrap();

    h.library.delete(&alice(), &doc.id).await.unwrap();
    assert!(h.docs.inner.is_empty());
}

#[tokio::test]
async fn record_with_missing_blob_reads_as_not_found() {
    let h = harness();
    let doc = upload(&h, &alice(), "a.pdf", &pattern(40)).await;
    h.blobs.inner.delete(&doc.blob_id).await.unwrap();

    let err = h.library.view(&alice(), &doc.id).await.unwrap_err();
    assert!(matches!(err, LibraryError::NotFound(_)));
    assert_eq!(h.library.metrics().snapshot().consistency_faults, 1);
}

#[tokio::test]
async fn listing_is_newest_first() {
    let h = harness();
    let mut ids = Vec::new();
    for name in ["one.pdf", "two.pdf", "three.pdf"] {
        ids.push(upload(&h, &alice(), name, b"content").await.id);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let listed = h.library.list(&alice(), ListQuery::default()).await.unwrap();
    let listed_ids: Vec<_> = listed.iter().map(|d| d.id.clone()).collect();
    ids.reverse();
    assert_eq!(listed_ids, ids);
    assert!(listed.windows(2).all(|w| w[0].upload_date > w[1].upload_date));
}

#[tokio::test]
async fn listing_scopes_and_filters() {
    let h = harness();
    let draft = DocumentDraft {
        tags: vec!["tax".into()],
        folder: Some("finance".into()),
        shared_with: vec![bob()],
        ..DocumentDraft::default()
    };
    let shared = h
        .library
        .upload(&alice(), pdf("w2.pdf"), draft, body(b"w2", 2))
        .await
        .unwrap();
    let own = upload(&h, &bob(), "bob.pdf", b"bob").await;

    let owned = h.library.list(&bob(), ListQuery::default()).await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, own.id);

    let incoming = h
        .library
        .list(
            &bob(),
            ListQuery {
                scope: ListScope::Shared,
                ..ListQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].id, shared.id);

    let tagged = h
        .library
        .list(
            &alice(),
            ListQuery {
                tag: Some(" tax ".into()),
                folder: Some("finance".into()),
                ..ListQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(tagged.len(), 1);

    let none = h
        .library
        .list(
            &alice(),
            ListQuery {
                tag: Some("medical".into()),
                ..ListQuery::default()
            },
        )
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn update_metadata_applies_patch() {
    let h = harness();
    let doc = upload(&h, &alice(), "a.pdf", b"abc").await;
    let patch = MetadataPatch {
        filename: Some("Passport.pdf".into()),
        description: Some("Expires soon".into()),
        tags: Some(vec!["travel".into(), "id".into()]),
        folder: Some("documents".into()),
        expiry_date: Some(chrono::NaiveDate::from_ymd_opt(2027, 5, 1)),
        reminder_enabled: Some(true),
        expected_version: Some(1),
    };
    let updated = h.library.update_metadata(&alice(), &doc.id, patch).await.unwrap();

    assert_eq!(updated.filename, "Passport.pdf");
    assert_eq!(updated.description.as_deref(), Some("Expires soon"));
    assert_eq!(updated.tags.len(), 2);
    assert_eq!(updated.folder.as_deref(), Some("documents"));
    assert!(updated.reminder_enabled);
    assert_eq!(updated.version, 2);
    assert_eq!(updated.blob_id, doc.blob_id);
    assert_eq!(updated.file_size, doc.file_size);

    let cleared = h
        .library
        .update_metadata(
            &alice(),
            &doc.id,
            MetadataPatch {
                folder: Some(String::new()),
                expiry_date: Some(None),
                ..MetadataPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.folder, None);
    assert_eq!(cleared.expiry_date, None);
    assert_eq!(cleared.filename, "Passport.pdf");
}

#[tokio::test]
async fn stale_expected_version_conflicts() {
    let h = harness();
    let doc = upload(&h, &alice(), "a.pdf", b"abc").await;
    h.library
        .update_metadata(&alice(), &doc.id, MetadataPatch::default())
        .await
        .unwrap();

    let err = h
        .library
        .update_metadata(
            &alice(),
            &doc.id,
            MetadataPatch {
                filename: Some("late.pdf".into()),
                expected_version: Some(1),
                ..MetadataPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Conflict(_)), "{err:?}");
}

#[tokio::test]
async fn invalid_patch_is_rejected() {
    let h = harness();
    let doc = upload(&h, &alice(), "a.pdf", b"abc").await;
    let err = h
        .library
        .update_metadata(
            &alice(),
            &doc.id,
            MetadataPatch {
                filename: Some("   ".into()),
                ..MetadataPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::InvalidInput(_)));
}

#[tokio::test]
async fn share_rules() {
    let h = harness();
    let doc = upload(&h, &alice(), "a.pdf", b"abc").await;

    let err = h
        .library
        .share(&alice(), &doc.id, alice(), AccessLevel::View)
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::InvalidInput(_)));

    let err = h
        .library
        .share(&alice(), &doc.id, mallory(), AccessLevel::View)
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::InvalidInput(_)), "not family");

    h.library
        .share(&alice(), &doc.id, bob(), AccessLevel::View)
        .await
        .unwrap();
    let again = h
        .library
        .share(&alice(), &doc.id, bob(), AccessLevel::Edit)
        .await
        .unwrap();
    assert_eq!(again.shared_with.len(), 1, "re-sharing updates in place");
    assert_eq!(again.shared_with[0].access, AccessLevel::Edit);

    let after = h.library.unshare(&alice(), &doc.id, &bob()).await.unwrap();
    assert!(after.shared_with.is_empty());
    let err = h.library.view(&bob(), &doc.id).await.unwrap_err();
    assert!(matches!(err, LibraryError::Forbidden(_)));

    let err = h.library.unshare(&alice(), &doc.id, &bob()).await.unwrap_err();
    assert!(matches!(err, LibraryError::NotFound(_)));
}

#[tokio::test]
async fn unknown_document_is_not_found() {
    let h = harness();
    let missing = DocumentId::generate();
    assert!(matches!(
        h.library.view(&alice(), &missing).await.unwrap_err(),
        LibraryError::NotFound(_)
    ));
    assert!(matches!(
        h.library.delete(&alice(), &missing).await.unwrap_err(),
        LibraryError::NotFound(_)
    ));
    assert!(matches!(
        h.library
            .replace(&alice(), &missing, pdf("a.pdf"), body(b"a", 1))
            .await
            .unwrap_err(),
        LibraryError::NotFound(_)
    ));
}

#[tokio::test]
async fn concurrent_uploads_are_independent() {
    let h = harness();
    let owner = alice();
    let payloads: Vec<Vec<u8>> = (1..=6).map(|i| pattern(i * 13)).collect();
    let uploads = payloads.iter().enumerate().map(|(i, data)| {
        let owner = owner.clone();
        let name = format!("doc-{i}.pdf");
        let library = &h.library;
        async move {
            library
                .upload(&owner, pdf(&name), DocumentDraft::default(), body(data, 5))
                .await
        }
    });
    let docs = futures::future::join_all(uploads).await;

    for (doc, data) in docs.into_iter().zip(&payloads) {
        let doc = doc.unwrap();
        assert_eq!(read_all(&h, &owner, &doc.id).await.unwrap(), *data);
    }
    assert_eq!(h.blobs.inner.blob_count(), payloads.len());
}
