mod config;
mod migrations;
mod store;

pub use config::PostgresBlobConfig;
pub use migrations::run_migrations;
pub use store::{PostgresBlobStore, PostgresBlobWriter};
