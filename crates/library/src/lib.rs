pub mod builder;
pub mod error;
pub mod library;
pub mod membership;
pub mod metrics;
pub mod upload;

#[cfg(test)]
mod tests;

pub use builder::LibraryBuilder;
pub use error::LibraryError;
pub use library::{DocumentDownload, DocumentLibrary, ListQuery, MetadataPatch};
pub use membership::{MembershipDirectory, OpenDirectory, StaticFamilies};
pub use metrics::{LibraryMetrics, MetricsSnapshot};
pub use upload::{DocumentDraft, FileDescriptor, StagedUpload};
