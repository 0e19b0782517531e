//! Error handling for export runs.
//!
//! This module provides:
//! - One error kind per pipeline stage (connection, catalog, count, stream, archive)
//! - Cancellation as a distinct, non-exceptional termination
//! - Structured information extraction from MongoDB driver errors
//!
//! # Example
//!
//! ```rust,no_run
//! use docdump::error::{ExportError, Result, StreamError};
//!
//! fn read_table() -> Result<()> {
//!     Err(StreamError::new("shop", "orders", 3, "connection reset").into())
//! }
//!
//! if let Err(e) = read_table() {
//!     eprintln!("{e}");
//!     std::process::exit(e.exit_code());
//! }
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{
    ArchiveError, CatalogError, ConfigError, ConnectionError, CountError, ExportError, Result,
    StreamError,
};
pub use mongo::ErrorInfo;
