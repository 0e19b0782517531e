//! Export pipeline
//!
//! An export run moves through five components:
//!
//! 1. **catalog**: selected databases → [`Manifest`] of tables
//! 2. **estimate**: manifest → total document count for progress
//! 3. **streaming**: one lazy cursor per table, fed into a bounded channel
//! 4. **archive**: ZIP writer, one JSON entry per document
//! 5. **coordinator**: the state machine driving the stages above
//!
//! The coordinator talks to the outside through three ports: the
//! connection ([`crate::connection::Connector`]), the operator's choices
//! ([`Selector`]) and progress reporting ([`Reporter`]).

pub mod archive;
pub mod catalog;
pub mod coordinator;
pub mod estimate;
pub mod progress;
pub mod selection;
pub mod streaming;

pub use archive::{ArchiveOptions, ArchiveSink, ArchiveStats};
pub use catalog::{Manifest, TableRef};
pub use coordinator::{ExportCoordinator, ExportSettings, ExportState, ExportSummary};
pub use progress::{ChannelReporter, ConsoleReporter, ExportEvent, NullReporter, Reporter};
pub use selection::{DatabaseChoice, Selector, StaticSelection};
pub use streaming::{StreamOptions, TableStream};
