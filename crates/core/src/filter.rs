use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::types::UserId;

/// Which documents a listing covers, relative to the requester.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ListScope {
    /// Documents the requester owns.
    #[default]
    Owned,
    /// Documents other users shared with the requester.
    Shared,
    /// Both of the above.
    All,
}

/// Selection criteria for listing document records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFilter {
    /// The user the listing is computed for.
    pub requester: UserId,
    pub scope: ListScope,
    /// Only documents carrying this tag.
    pub tag: Option<String>,
    /// Only documents filed under this folder.
    pub folder: Option<String>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Number of records to skip after sorting.
    pub offset: usize,
}

impl DocumentFilter {
    /// Owned documents of `requester`, unfiltered and unpaginated.
    pub fn owned_by(requester: UserId) -> Self {
        Self {
            requester,
            scope: ListScope::Owned,
            tag: None,
            folder: None,
            limit: None,
            offset: 0,
        }
    }

    /// Whether `doc` belongs in this listing (ignoring pagination).
    pub fn matches(&self, doc: &Document) -> bool {
        let owned = doc.owner_id == self.requester;
        let shared = !owned && doc.share_for(&self.requester).is_some();
        let in_scope = match self.scope {
            ListScope::Owned => owned,
            ListScope::Shared => shared,
            ListScope::All => owned || shared,
        };
        in_scope
            && self.tag.as_ref().is_none_or(|t| doc.tags.contains(t))
            && self
                .folder
                .as_ref()
                .is_none_or(|f| doc.folder.as_ref() == Some(f))
    }

    /// Sort `docs` into listing order and apply `offset`/`limit`.
    pub fn paginate(&self, mut docs: Vec<Document>) -> Vec<Document> {
        docs.sort_by(recent_first);
        docs.into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Listing order: newest `upload_date` first, ties broken by descending id.
pub fn recent_first(a: &Document, b: &Document) -> Ordering {
    b.upload_date
        .cmp(&a.upload_date)
        .then_with(|| b.id.cmp(&a.id))
}
