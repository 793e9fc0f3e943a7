mod auth;
mod logging;
mod server;
mod storage;


pub use auth::*;
pub use logging::*;
pub use server::*;
pub use storage::*;

use serde::Deserialize;

use docvault_core::UploadPolicy;

/// Top-level configuration for the docvault server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct DocvaultConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Where file bytes are stored.
    #[serde(default)]
    pub blob: BlobConfig,
    /// Where document records are stored.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Accepted content types and the size ceiling.
    #[serde(default)]
    pub uploads: UploadPolicy,
    /// Token verification settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Family groups whose members may share documents with each other.
    ///
    /// When empty, any two distinct users may share.
    #[serde(default)]
    pub families: Vec<FamilyConfig>,
}
