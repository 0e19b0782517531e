//! docdump library
//!
//! Streams the documents of a MongoDB deployment into a ZIP archive laid
//! out as `{database}/{collection}/{id}.json`.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and interactive prompts
//! - `config`: Configuration management
//! - `connection`: Connection port and its MongoDB implementation
//! - `error`: Error types and handling
//! - `export`: The export pipeline and its coordinator
//! - `formatter`: JSON rendering of documents
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docdump::config::Config;
//! use docdump::connection::MongoConnector;
//! use docdump::export::{ExportCoordinator, ExportSettings, NullReporter, StaticSelection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let connector = MongoConnector::new(
//!         "mongodb://localhost:27017".to_string(),
//!         config.connection.clone(),
//!         false,
//!     );
//!
//!     let mut coordinator = ExportCoordinator::new(
//!         Arc::new(connector),
//!         Arc::new(StaticSelection::named(["shop"], "shop.zip")),
//!         Arc::new(NullReporter),
//!         ExportSettings::from_config(&config.export),
//!     );
//!     let summary = coordinator.run().await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod formatter;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExportError, Result};
pub use export::{ExportCoordinator, ExportSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
