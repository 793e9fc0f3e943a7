use std::collections::BTreeSet;

use chrono::{Duration, TimeZone, Utc};

use docvault_core::{
    AccessLevel, BlobId, Document, DocumentFilter, DocumentId, ListScope, UserId,
};

use crate::error::MetadataError;
use crate::store::DocumentStore;

/// Build a version-1 record owned by `owner`, uploaded `minutes` after a
/// fixed epoch.
pub fn sample_document(owner: &UserId, minutes: i64) -> Document {
    let id = DocumentId::generate();
    Document {
        filename: format!("doc-{minutes}.pdf"),
        original_name: format!("scan-{minutes}.pdf"),
        blob_id: BlobId::generate(),
        owner_id: owner.clone(),
        mime_type: "application/pdf".into(),
        file_size: 1024,
        upload_date: Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
            + Duration::minutes(minutes),
        tags: BTreeSet::new(),
        description: None,
        shared_with: Vec::new(),
        folder: None,
        expiry_date: None,
        reminder_enabled: false,
        version: 1,
        id,
    }
}

fn unique_user(label: &str) -> UserId {
    UserId::new(format!("{label}-{}", DocumentId::generate()))
}

fn ids(docs: &[Document]) -> Vec<DocumentId> {
    docs.iter().map(|d| d.id.clone()).collect()
}

/// Run the full document store conformance test suite.
///
/// Every test uses freshly generated owner ids, so the suite can run
/// against a store that already holds unrelated records.
///
/// # Errors
///
/// Returns an error if any storage call fails unexpectedly.
pub async fn run_store_conformance_tests(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    test_insert_and_get(store).await?;
    test_duplicate_insert(store).await?;
    test_get_missing(store).await?;
    test_update_bumps_version(store).await?;
    test_stale_update_conflicts(store).await?;
    test_update_missing(store).await?;
    test_delete(store).await?;
    test_list_scopes(store).await?;
    test_list_filters(store).await?;
    test_list_order_and_pagination(store).await?;
    Ok(())
}

async fn test_insert_and_get(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    let owner = unique_user("owner");
    let mut doc = sample_document(&owner, 0);
    doc.tags = BTreeSet::from(["medical".to_owned(), "2025".to_owned()]);
    doc.description = Some("Blood test results".into());
    doc.folder = Some("health".into());
    doc.expiry_date = chrono::NaiveDate::from_ymd_opt(2026, 6, 30);
    doc.reminder_enabled = true;
    doc.upsert_share(unique_user("kid"), AccessLevel::View);

    store.insert(&doc).await?;
    let fetched = store.get(&doc.id).await?;
    assert_eq!(fetched.as_ref(), Some(&doc), "record must round-trip unchanged");
    Ok(())
}

async fn test_duplicate_insert(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    let doc = sample_document(&unique_user("owner"), 0);
    store.insert(&doc).await?;
    let err = store.insert(&doc).await.err();
    assert!(
        matches!(err, Some(MetadataError::AlreadyExists(_))),
        "second insert should be AlreadyExists, got {err:?}"
    );
    Ok(())
}

async fn test_get_missing(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    assert!(store.get(&DocumentId::generate()).await?.is_none());
    Ok(())
}

async fn test_update_bumps_version(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    let mut doc = sample_document(&unique_user("owner"), 0);
    store.insert(&doc).await?;

    doc.filename = "renamed.pdf".into();
    let stored = store.update(&doc, 1).await?;
    assert_eq!(stored.version, 2);
    assert_eq!(stored.filename, "renamed.pdf");

    let fetched = store.get(&doc.id).await?;
    assert_eq!(fetched.as_ref().map(|d| d.version), Some(2));
    assert_eq!(fetched.map(|d| d.filename).as_deref(), Some("renamed.pdf"));

    let again = store.update(&stored, 2).await?;
    assert_eq!(again.version, 3);
    Ok(())
}

async fn test_stale_update_conflicts(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    let doc = sample_document(&unique_user("owner"), 0);
    store.insert(&doc).await?;

    let mut first = doc.clone();
    first.filename = "first.pdf".into();
    store.update(&first, 1).await?;

    let mut second = doc.clone();
    second.filename = "second.pdf".into();
    let err = store.update(&second, 1).await.err();
    assert!(
        matches!(
            err,
            Some(MetadataError::VersionConflict {
                expected: 1,
                found: 2
            })
        ),
        "stale update should conflict, got {err:?}"
    );

    let fetched = store.get(&doc.id).await?;
    assert_eq!(
        fetched.map(|d| d.filename).as_deref(),
        Some("first.pdf"),
        "losing update must not be applied"
    );
    Ok(())
}

async fn test_update_missing(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    let doc = sample_document(&unique_user("owner"), 0);
    let err = store.update(&doc, 1).await.err();
    assert!(
        matches!(err, Some(MetadataError::NotFound(_))),
        "update of unknown record should be NotFound, got {err:?}"
    );
    Ok(())
}

async fn test_delete(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    let doc = sample_document(&unique_user("owner"), 0);
    store.insert(&doc).await?;
    store.delete(&doc.id).await?;
    assert!(store.get(&doc.id).await?.is_none());

    let err = store.delete(&doc.id).await.err();
    assert!(
        matches!(err, Some(MetadataError::NotFound(_))),
        "second delete should be NotFound, got {err:?}"
    );
    Ok(())
}

async fn test_list_scopes(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    let me = unique_user("me");
    let other = unique_user("other");

    let mine = sample_document(&me, 0);
    let mut shared = sample_document(&other, 1);
    shared.upsert_share(me.clone(), AccessLevel::Edit);
    let private = sample_document(&other, 2);
    for doc in [&mine, &shared, &private] {
        store.insert(doc).await?;
    }

    let mut filter = DocumentFilter::owned_by(me.clone());
    assert_eq!(ids(&store.list(&filter).await?), vec![mine.id.clone()]);

    filter.scope = ListScope::Shared;
    assert_eq!(ids(&store.list(&filter).await?), vec![shared.id.clone()]);

    filter.scope = ListScope::All;
    assert_eq!(
        ids(&store.list(&filter).await?),
        vec![shared.id.clone(), mine.id.clone()]
    );

    let theirs = store.list(&DocumentFilter::owned_by(other)).await?;
    assert_eq!(ids(&theirs), vec![private.id, shared.id]);
    Ok(())
}

async fn test_list_filters(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    let me = unique_user("me");

    let mut tagged = sample_document(&me, 0);
    tagged.tags.insert("insurance".into());
    let mut filed = sample_document(&me, 1);
    filed.folder = Some("vehicles".into());
    let plain = sample_document(&me, 2);
    for doc in [&tagged, &filed, &plain] {
        store.insert(doc).await?;
    }

    let by_tag = DocumentFilter {
        tag: Some("insurance".into()),
        ..DocumentFilter::owned_by(me.clone())
    };
    assert_eq!(ids(&store.list(&by_tag).await?), vec![tagged.id]);

    let by_folder = DocumentFilter {
        folder: Some("vehicles".into()),
        ..DocumentFilter::owned_by(me)
    };
    assert_eq!(ids(&store.list(&by_folder).await?), vec![filed.id]);
    Ok(())
}

async fn test_list_order_and_pagination(store: &dyn DocumentStore) -> Result<(), MetadataError> {
    let me = unique_user("me");
    let docs: Vec<Document> = (0..5).map(|i| sample_document(&me, i)).collect();
    for doc in &docs {
        store.insert(doc).await?;
    }

    let all = store.list(&DocumentFilter::owned_by(me.clone())).await?;
    let expected: Vec<DocumentId> = docs.iter().rev().map(|d| d.id.clone()).collect();
    assert_eq!(ids(&all), expected, "newest upload first");

    let page = DocumentFilter {
        limit: Some(2),
        offset: 1,
        ..DocumentFilter::owned_by(me.clone())
    };
    assert_eq!(ids(&store.list(&page).await?), expected[1..3].to_vec());

    // Equal timestamps fall back to descending id.
    let mut twin_a = sample_document(&me, 10);
    let mut twin_b = sample_document(&me, 10);
    if twin_a.id > twin_b.id {
        std::mem::swap(&mut twin_a, &mut twin_b);
    }
    store.insert(&twin_a).await?;
    store.insert(&twin_b).await?;
    let first_two = DocumentFilter {
        limit: Some(2),
        ..DocumentFilter::owned_by(me)
    };
    assert_eq!(
        ids(&store.list(&first_two).await?),
        vec![twin_b.id, twin_a.id]
    );
    Ok(())
}
