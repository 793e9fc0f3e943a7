use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BlobId, DocumentId, UserId};

/// Access level granted to a family member on a shared document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// May read the document's metadata and bytes.
    View,
    /// May additionally edit metadata and replace the content.
    Edit,
}

/// A single share entry on a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Share {
    /// The family member the document is shared with.
    pub member_id: UserId,
    /// What the member may do with the document.
    pub access: AccessLevel,
}

/// The effective relationship between a user and a document.
///
/// Holding any role grants read access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentRole {
    Owner,
    Editor,
    Viewer,
}

impl DocumentRole {
    /// Owners and `edit` members may change metadata or content.
    pub fn can_edit(self) -> bool {
        matches!(self, Self::Owner | Self::Editor)
    }

    /// Only the owner may delete the document or change its shares.
    pub fn can_manage(self) -> bool {
        matches!(self, Self::Owner)
    }
}

/// Metadata record describing one uploaded document.
///
/// The bytes themselves live in the blob store under [`blob_id`](Self::blob_id).
/// A record always references exactly one blob, and `file_size` is the byte
/// length of that blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "openapi", schema(example = json!({
    "id": "0192f5c4-8a4e-7c1d-9f3e-2b6a1d0c9e11",
    "ownerId": "507f1f77bcf86cd799439011",
    "filename": "Car Insurance.pdf",
    "originalName": "insurance-2025.pdf",
    "blobId": "0192f5c4-8a40-7a2b-8c11-5e0d3f6a7b21",
    "mimeType": "application/pdf",
    "fileSize": 482133,
    "uploadDate": "2025-03-02T09:15:00Z",
    "tags": ["car", "insurance"],
    "description": "Annual policy",
    "sharedWith": [{"memberId": "507f191e810c19729de860ea", "access": "view"}],
    "folder": "vehicles",
    "expiryDate": "2026-03-01",
    "reminderEnabled": true,
    "version": 1
})))]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique, immutable identifier.
    pub id: DocumentId,
    /// The owning user. Immutable.
    pub owner_id: UserId,
    /// Display name.
    pub filename: String,
    /// Name of the file as uploaded.
    pub original_name: String,
    /// Blob holding the current content.
    pub blob_id: BlobId,
    /// Declared content type, validated at upload/replace time.
    pub mime_type: String,
    /// Byte length of the referenced blob.
    pub file_size: u64,
    /// When the current content was uploaded.
    pub upload_date: DateTime<Utc>,
    /// Free-form labels.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Family members the document is shared with. Member ids are unique.
    #[serde(default)]
    pub shared_with: Vec<Share>,
    /// Folder the document is filed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// Date the underlying paper document expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    /// Whether an expiry reminder was requested.
    #[serde(default)]
    pub reminder_enabled: bool,
    /// Optimistic concurrency version, bumped on every committed update.
    pub version: u64,
}

impl Document {
    /// Return the role `user` holds on this document, if any.
    pub fn role_of(&self, user: &UserId) -> Option<DocumentRole> {
        if &self.owner_id == user {
            return Some(DocumentRole::Owner);
        }
        self.share_for(user).map(|share| match share.access {
            AccessLevel::Edit => DocumentRole::Editor,
            AccessLevel::View => DocumentRole::Viewer,
        })
    }

    /// Look up the share entry for `member`.
    pub fn share_for(&self, member: &UserId) -> Option<&Share> {
        self.shared_with.iter().find(|s| &s.member_id == member)
    }

    /// Add `member` with `access`, or change the access of an existing entry.
    ///
    /// Returns `true` if a new entry was added.
    pub fn upsert_share(&mut self, member: UserId, access: AccessLevel) -> bool {
        if let Some(existing) = self.shared_with.iter_mut().find(|s| s.member_id == member) {
            existing.access = access;
            return false;
        }
        self.shared_with.push(Share {
            member_id: member,
            access,
        });
        true
    }

    /// Remove `member` from the share list. Returns `true` if it was present.
    pub fn remove_share(&mut self, member: &UserId) -> bool {
        let before = self.shared_with.len();
        self.shared_with.retain(|s| &s.member_id != member);
        self.shared_with.len() != before
    }

    /// Ids of every member the document is shared with.
    pub fn shared_member_ids(&self) -> Vec<String> {
        self.shared_with
            .iter()
            .map(|s| s.member_id.to_string())
            .collect()
    }

    /// Point the record at freshly written content and return the previous blob id.
    ///
    /// Tags, description, shares and folder are left untouched.
    pub fn swap_content(&mut self, content: ContentRef) -> BlobId {
        self.file_size = content.file_size;
        self.mime_type = content.mime_type;
        self.original_name = content.original_name;
        self.upload_date = content.uploaded_at;
        std::mem::replace(&mut self.blob_id, content.blob_id)
    }
}

/// Description of a finalized blob that a document record can point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub blob_id: BlobId,
    pub file_size: u64,
    pub mime_type: String,
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document {
            id: DocumentId::new("doc-1"),
            owner_id: UserId::new("owner"),
            filename: "passport.pdf".into(),
            original_name: "scan_001.pdf".into(),
            blob_id: BlobId::new("blob-1"),
            mime_type: "application/pdf".into(),
            file_size: 1024,
            upload_date: Utc::now(),
            tags: BTreeSet::from(["travel".to_owned()]),
            description: Some("Family passport".into()),
            shared_with: Vec::new(),
            folder: Some("ids".into()),
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1),
            reminder_enabled: true,
            version: 1,
        }
    }

    #[test]
    fn owner_has_full_role() {
        let doc = sample();
        let role = doc.role_of(&UserId::new("owner")).unwrap();
        assert!(role.can_edit() && role.can_manage());
    }

    #[test]
    fn stranger_has_no_role() {
        assert!(sample().role_of(&UserId::new("stranger")).is_none());
    }

    #[test]
    fn share_levels_map_to_roles() {
        let mut doc = sample();
        doc.upsert_share(UserId::new("kid"), AccessLevel::View);
        doc.upsert_share(UserId::new("spouse"), AccessLevel::Edit);

        let viewer = doc.role_of(&UserId::new("kid")).unwrap();
        assert_eq!(viewer, DocumentRole::Viewer);
        assert!(!viewer.can_edit());

        let editor = doc.role_of(&UserId::new("spouse")).unwrap();
        assert!(editor.can_edit());
        assert!(!editor.can_manage());
    }

    #[test]
    fn upsert_share_never_duplicates() {
        let mut doc = sample();
        assert!(doc.upsert_share(UserId::new("kid"), AccessLevel::View));
        assert!(!doc.upsert_share(UserId::new("kid"), AccessLevel::Edit));
        assert_eq!(doc.shared_with.len(), 1);
        assert_eq!(doc.shared_with[0].access, AccessLevel::Edit);
    }

    #[test]
    fn remove_share_reports_presence() {
        let mut doc = sample();
        doc.upsert_share(UserId::new("kid"), AccessLevel::View);
        assert!(doc.remove_share(&UserId::new("kid")));
        assert!(!doc.remove_share(&UserId::new("kid")));
        assert!(doc.shared_with.is_empty());
    }

    #[test]
    fn swap_content_keeps_classification() {
        let mut doc = sample();
        doc.upsert_share(UserId::new("kid"), AccessLevel::View);
        let before = doc.clone();

        let previous = doc.swap_content(ContentRef {
            blob_id: BlobId::new("blob-2"),
            file_size: 2048,
            mime_type: "image/png".into(),
            original_name: "rescan.png".into(),
            uploaded_at: Utc::now(),
        });

        assert_eq!(previous, BlobId::new("blob-1"));
        assert_eq!(doc.blob_id, BlobId::new("blob-2"));
        assert_eq!(doc.file_size, 2048);
        assert_eq!(doc.tags, before.tags);
        assert_eq!(doc.description, before.description);
        assert_eq!(doc.shared_with, before.shared_with);
        assert_eq!(doc.folder, before.folder);
        assert_eq!(doc.filename, before.filename);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["ownerId"], "owner");
        assert_eq!(json["blobId"], "blob-1");
        assert_eq!(json["fileSize"], 1024);
        assert_eq!(json["expiryDate"], "2030-01-01");
        assert_eq!(json["reminderEnabled"], true);
        assert!(json.get("owner_id").is_none());
    }
}
