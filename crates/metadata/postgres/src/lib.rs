mod config;
mod migrations;
mod store;

pub use config::PostgresMetadataConfig;
pub use migrations::run_migrations;
pub use store::PostgresDocumentStore;
