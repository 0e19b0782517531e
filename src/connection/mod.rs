//! Connection port for the source database
//!
//! The export pipeline depends only on the capability set defined here:
//! - [`Connector`] establishes a session (`connect`)
//! - [`DocumentStore`] lists databases and tables, counts documents and
//!   opens cursors, and is closed when the run ends
//!
//! [`MongoConnector`] and [`MongoStore`] implement the port for MongoDB.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use mongodb::bson::Document;

use crate::error::Result;

pub mod mongo;

#[cfg(test)]
pub(crate) mod memory;

pub use mongo::{ConnectionState, MongoConnector, MongoStore, sanitize_uri};

/// Lazy, single-pass sequence of documents backed by a server-side cursor
pub type DocumentCursor = BoxStream<'static, Result<Document>>;

/// Establishes a session with the source database
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and verify the server is reachable
    ///
    /// Failures are reported as `ExportError::Connection`.
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>>;
}

/// Read-only view of a connected document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One-line description of the connected server, for stage summaries
    fn describe(&self) -> String;

    /// Names of all databases visible to the session
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Names of all tables (collections) in `database`
    async fn list_tables(&self, database: &str) -> Result<Vec<String>>;

    /// Number of documents in `database.table`
    async fn count(&self, database: &str, table: &str) -> Result<u64>;

    /// Open a cursor over every document of `database.table`
    async fn open_cursor(&self, database: &str, table: &str, batch_size: u32)
    -> Result<DocumentCursor>;

    /// Release the session
    async fn close(&self) -> Result<()>;
}
