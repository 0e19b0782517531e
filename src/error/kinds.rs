use std::path::PathBuf;
use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`ExportError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export runs.
///
/// Each pipeline stage has its own error kind; the coordinator surfaces
/// whichever one aborted the run unchanged.
#[derive(Debug)]
pub enum ExportError {
    /// Source database could not be reached.
    Connection(ConnectionError),

    /// Table enumeration failed.
    Catalog(CatalogError),

    /// Document counting failed.
    Count(CountError),

    /// A cursor failed while streaming a table.
    Stream(StreamError),

    /// The destination archive could not be created or written.
    Archive(ArchiveError),

    /// The operator interrupted the run.
    Cancelled,

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors outside the archive sink (prompts, config files).
    Io(io::Error),

    /// MongoDB driver errors not yet attributed to a stage.
    Driver(mongodb::error::Error),

    /// Broken internal invariant (writer thread panicked, etc.).
    Internal(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Connection timeout.
    Timeout,

    /// Invalid connection URI.
    InvalidUri(String),

    /// Connection lost.
    Disconnected,

    /// Not currently connected to MongoDB.
    NotConnected,

    /// Ping command failed.
    PingFailed(String),
}

/// Table enumeration errors.
#[derive(Debug)]
pub enum CatalogError {
    /// No database was selected.
    EmptySelection,

    /// Database name is not a legal name.
    InvalidDatabase(String),

    /// Database does not exist on the server.
    UnknownDatabase(String),

    /// Listing databases on the server failed.
    ListDatabasesFailed(String),

    /// Listing the tables of one database failed.
    ListTablesFailed { database: String, reason: String },
}

/// Document count errors.
#[derive(Debug)]
pub enum CountError {
    /// A count query for one table failed.
    CountFailed {
        database: String,
        table: String,
        reason: String,
    },
}

/// Cursor failure while streaming one table.
///
/// `position` is the number of documents of `table` that were yielded
/// before the failure, which is also the number archived for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    pub database: String,
    pub table: String,
    pub position: u64,
    pub reason: String,
}

/// Archive sink errors.
#[derive(Debug)]
pub enum ArchiveError {
    /// Destination exists and overwriting was not requested.
    DestinationExists(PathBuf),

    /// Destination file could not be created.
    CreateFailed { path: PathBuf, reason: String },

    /// Writing one entry failed.
    WriteFailed { entry: String, reason: String },

    /// Document could not be serialized.
    SerializeFailed { entry: String, reason: String },

    /// Document has no usable id field.
    MissingDocumentId {
        database: String,
        table: String,
        position: u64,
        field: String,
    },

    /// Writing the central directory or flushing failed.
    FinalizeFailed(String),

    /// The archive was already finalized or abandoned.
    AlreadyFinalized,
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl ExportError {
    /// Process exit code for this error.
    ///
    /// Cancellation follows the shell convention for SIGINT.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExportError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Short stable name of the error kind, used in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::Connection(_) => "ConnectionError",
            ExportError::Catalog(_) => "CatalogError",
            ExportError::Count(_) => "CountError",
            ExportError::Stream(_) => "StreamError",
            ExportError::Archive(_) => "ArchiveError",
            ExportError::Cancelled => "CancelledError",
            ExportError::Config(_) => "ConfigError",
            ExportError::Io(_) => "IoError",
            ExportError::Driver(_) => "DriverError",
            ExportError::Internal(_) => "InternalError",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Cancelled)
    }
}

impl StreamError {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        position: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            position,
            reason: reason.into(),
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Connection(e) => write!(f, "Connection error: {e}"),
            ExportError::Catalog(e) => write!(f, "Catalog error: {e}"),
            ExportError::Count(e) => write!(f, "Count error: {e}"),
            ExportError::Stream(e) => write!(f, "Stream error: {e}"),
            ExportError::Archive(e) => write!(f, "Archive error: {e}"),
            ExportError::Cancelled => write!(f, "Export cancelled by operator"),
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::Driver(e) => format_mongodb_error(f, e),
            ExportError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::Timeout => write!(f, "Connection timeout"),
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::Disconnected => write!(f, "Connection lost"),
            ConnectionError::NotConnected => write!(f, "Not connected to MongoDB"),
            ConnectionError::PingFailed(msg) => write!(f, "Ping failed: {msg}"),
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::EmptySelection => write!(f, "No database selected"),
            CatalogError::InvalidDatabase(name) => write!(f, "Invalid database name: '{name}'"),
            CatalogError::UnknownDatabase(name) => {
                write!(f, "Database '{name}' does not exist on the server")
            }
            CatalogError::ListDatabasesFailed(msg) => {
                write!(f, "Failed to list databases: {msg}")
            }
            CatalogError::ListTablesFailed { database, reason } => {
                write!(f, "Failed to list tables of '{database}': {reason}")
            }
        }
    }
}

impl fmt::Display for CountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountError::CountFailed {
                database,
                table,
                reason,
            } => write!(f, "Failed to count '{database}.{table}': {reason}"),
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cursor over '{}.{}' failed after {} document(s): {} (resume from {}/{} at position {})",
            self.database,
            self.table,
            self.position,
            self.reason,
            self.database,
            self.table,
            self.position
        )
    }
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::DestinationExists(path) => write!(
                f,
                "Destination already exists: {} (pass --overwrite to replace it)",
                path.display()
            ),
            ArchiveError::CreateFailed { path, reason } => {
                write!(f, "Failed to create {}: {reason}", path.display())
            }
            ArchiveError::WriteFailed { entry, reason } => {
                write!(f, "Failed to write entry '{entry}': {reason}")
            }
            ArchiveError::SerializeFailed { entry, reason } => {
                write!(f, "Failed to serialize '{entry}': {reason}")
            }
            ArchiveError::MissingDocumentId {
                database,
                table,
                position,
                field,
            } => write!(
                f,
                "Document #{} of '{database}.{table}' has no '{field}' field",
                position + 1
            ),
            ArchiveError::FinalizeFailed(msg) => write!(f, "Failed to finalize archive: {msg}"),
            ArchiveError::AlreadyFinalized => write!(f, "Archive is already finalized"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ExportError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for CatalogError {}
impl std::error::Error for CountError {}
impl std::error::Error for StreamError {}
impl std::error::Error for ArchiveError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<mongodb::error::Error> for ExportError {
    fn from(err: mongodb::error::Error) -> Self {
        ExportError::Driver(err)
    }
}

impl From<ConnectionError> for ExportError {
    fn from(err: ConnectionError) -> Self {
        ExportError::Connection(err)
    }
}

impl From<CatalogError> for ExportError {
    fn from(err: CatalogError) -> Self {
        ExportError::Catalog(err)
    }
}

impl From<CountError> for ExportError {
    fn from(err: CountError) -> Self {
        ExportError::Count(err)
    }
}

impl From<StreamError> for ExportError {
    fn from(err: StreamError) -> Self {
        ExportError::Stream(err)
    }
}

impl From<ArchiveError> for ExportError {
    fn from(err: ArchiveError) -> Self {
        ExportError::Archive(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}
