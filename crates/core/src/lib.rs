pub mod document;
pub mod filter;
pub mod policy;
pub mod types;

pub use document::{AccessLevel, ContentRef, Document, DocumentRole, Share};
pub use filter::{DocumentFilter, ListScope, recent_first};
pub use policy::{
    DEFAULT_ALLOWED_MIME_TYPES, DEFAULT_MAX_FILE_SIZE, UploadPolicy, ValidationError,
    normalize_content_type, normalize_description, normalize_filename, normalize_tags,
};
pub use types::{BlobId, DocumentId, UserId};
