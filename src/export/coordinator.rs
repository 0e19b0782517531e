//! Export coordinator
//!
//! Drives one export run through its stages:
//!
//! ```text
//! Connecting → Enumerating → Estimating → ChoosingDestination
//!            → Streaming → Finalizing → Done
//! ```
//!
//! Any stage may fail, which moves the run to `Failed`: the archive is
//! abandoned, the connection closed and the error returned to the caller.
//!
//! During `Streaming` an async producer reads cursors and a blocking
//! writer serializes and compresses, joined by a bounded channel.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mongodb::bson::Document;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::archive::{self, ArchiveOptions, ArchiveSink};
use super::catalog::{self, CatalogOptions, Manifest, TableRef};
use super::estimate;
use super::progress::{ExportEvent, ProgressCounter, Reporter};
use super::selection::Selector;
use super::streaming::{self, PumpStats, StreamItem, StreamOptions};
use crate::config::{ExportConfig, JsonMode};
use crate::connection::{Connector, DocumentStore};
use crate::error::{ArchiveError, CatalogError, ExportError, Result};
use crate::formatter::{self, JsonFormatter};

/// Indentation of archived JSON documents
const JSON_INDENT: usize = 2;

/// Lifecycle of an export run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportState {
    Connecting,
    Enumerating,
    Estimating,
    ChoosingDestination,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

impl ExportState {
    /// Human readable stage name
    pub fn label(&self) -> &'static str {
        match self {
            ExportState::Connecting => "Connecting",
            ExportState::Enumerating => "Enumerating tables",
            ExportState::Estimating => "Counting documents",
            ExportState::ChoosingDestination => "Choosing destination",
            ExportState::Streaming => "Exporting documents",
            ExportState::Finalizing => "Finalizing archive",
            ExportState::Done => "Done",
            ExportState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportState::Done | ExportState::Failed)
    }

    /// Following state on success
    pub fn next(&self) -> Option<ExportState> {
        match self {
            ExportState::Connecting => Some(ExportState::Enumerating),
            ExportState::Enumerating => Some(ExportState::Estimating),
            ExportState::Estimating => Some(ExportState::ChoosingDestination),
            ExportState::ChoosingDestination => Some(ExportState::Streaming),
            ExportState::Streaming => Some(ExportState::Finalizing),
            ExportState::Finalizing => Some(ExportState::Done),
            ExportState::Done | ExportState::Failed => None,
        }
    }

    pub fn can_transition_to(&self, to: ExportState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == ExportState::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Tunables of one run, resolved from configuration
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub catalog: CatalogOptions,
    pub stream: StreamOptions,
    pub archive: ArchiveOptions,
    /// Capacity of the cursor → writer channel
    pub prefetch: usize,
    pub json_mode: JsonMode,
    pub id_field: String,
    pub keep_partial: bool,
}

impl ExportSettings {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            catalog: CatalogOptions {
                include_system: config.include_system_collections,
            },
            stream: StreamOptions {
                batch_size: config.batch_size,
                read_timeout: config.read_timeout(),
            },
            archive: ArchiveOptions::new(config.overwrite, config.compression_level),
            prefetch: config.prefetch.max(1),
            json_mode: config.json_mode,
            id_field: config.id_field.clone(),
            keep_partial: config.keep_partial,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub destination: PathBuf,
    /// Documents written per table, in manifest order
    pub tables: Vec<(TableRef, u64)>,
    pub written: u64,
    pub estimate: u64,
    /// Archive size on disk
    pub archive_bytes: u64,
    /// Uncompressed size of the archived documents
    pub payload_bytes: u64,
    pub elapsed: Duration,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Exported {} document(s) from {} table(s) to {}",
            self.written,
            self.tables.len(),
            self.destination.display()
        )?;
        for (table, count) in &self.tables {
            writeln!(f, "  {table}: {count}")?;
        }
        write!(
            f,
            "Archive size: {} bytes ({} uncompressed), elapsed: {:.2}s",
            self.archive_bytes,
            self.payload_bytes,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Mutable state of one run, torn down at `Done` or `Failed`
struct ExportContext {
    state: ExportState,
    history: Vec<ExportState>,
    store: Option<Arc<dyn DocumentStore>>,
    sink: Option<ArchiveSink>,
    estimate: u64,
    written: u64,
    started: Instant,
}

impl ExportContext {
    fn new() -> Self {
        Self {
            state: ExportState::Connecting,
            history: vec![ExportState::Connecting],
            store: None,
            sink: None,
            estimate: 0,
            written: 0,
            started: Instant::now(),
        }
    }

    fn transition(&mut self, to: ExportState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "invalid transition {:?} -> {:?}",
            self.state,
            to
        );
        debug!("Export state {:?} -> {:?}", self.state, to);
        self.state = to;
        self.history.push(to);
    }
}

/// Coordinator for one export run
pub struct ExportCoordinator {
    connector: Arc<dyn Connector>,
    selector: Arc<dyn Selector>,
    reporter: Arc<dyn Reporter>,
    settings: ExportSettings,
    cancel: CancellationToken,
    history: Vec<ExportState>,
}

impl ExportCoordinator {
    /// Create a new export coordinator
    ///
    /// # Arguments
    /// * `connector` - Connection port
    /// * `selector` - Selection port
    /// * `reporter` - Reporting port
    /// * `settings` - Pipeline tunables
    pub fn new(
        connector: Arc<dyn Connector>,
        selector: Arc<dyn Selector>,
        reporter: Arc<dyn Reporter>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            connector,
            selector,
            reporter,
            settings,
            cancel: CancellationToken::new(),
            history: Vec::new(),
        }
    }

    /// Set cancellation token for this export operation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// States visited by the last run, in order
    pub fn history(&self) -> &[ExportState] {
        &self.history
    }

    /// Run the export to completion
    ///
    /// On failure the partial archive is abandoned and the connection
    /// closed before the error is returned.
    pub async fn run(&mut self) -> Result<ExportSummary> {
        let mut ctx = ExportContext::new();
        let result = self.drive(&mut ctx).await;

        if let Err(ref e) = result {
            self.fail(&mut ctx, e).await;
        }

        self.history = ctx.history;
        result
    }

    async fn drive(&self, ctx: &mut ExportContext) -> Result<ExportSummary> {
        // Connecting
        self.reporter
            .report(ExportEvent::StageStarted(ExportState::Connecting));
        let store = self.cancellable(self.connector.connect()).await?;
        ctx.store = Some(store.clone());
        self.succeed(ctx, store.describe());

        // Enumerating
        self.enter(ctx, ExportState::Enumerating)?;
        let available = self
            .cancellable(store.list_databases())
            .await
            .map_err(|e| match e {
                ExportError::Cancelled => e,
                other => CatalogError::ListDatabasesFailed(other.to_string()).into(),
            })?;
        let selection = self
            .cancellable(self.selector.choose_databases(&available))
            .await?;
        let manifest = self
            .cancellable(catalog::enumerate(
                store.as_ref(),
                &available,
                &selection,
                self.settings.catalog,
            ))
            .await?;
        self.succeed(
            ctx,
            format!(
                "{} table(s) in {} database(s)",
                manifest.table_count(),
                manifest.database_count()
            ),
        );

        // Estimating
        self.enter(ctx, ExportState::Estimating)?;
        ctx.estimate = self
            .cancellable(estimate::estimate(store.as_ref(), &manifest))
            .await?;
        self.succeed(ctx, format!("~{} document(s)", ctx.estimate));

        // ChoosingDestination
        self.enter(ctx, ExportState::ChoosingDestination)?;
        let destination = self
            .cancellable(self.selector.choose_destination(&manifest, ctx.estimate))
            .await?;
        ctx.sink = Some(ArchiveSink::create(&destination, self.settings.archive)?);
        self.succeed(ctx, destination.display().to_string());

        // Streaming
        self.enter(ctx, ExportState::Streaming)?;
        let stats = self.stream(ctx, store.clone(), &manifest).await?;
        self.succeed(ctx, format!("{} document(s) written", ctx.written));

        // Finalizing
        self.enter(ctx, ExportState::Finalizing)?;
        let sink = ctx
            .sink
            .take()
            .ok_or_else(|| ExportError::Internal("archive missing at finalize".to_string()))?;
        let archive = tokio::task::spawn_blocking(move || sink.finalize())
            .await
            .map_err(|e| ExportError::Internal(format!("finalize task failed: {e}")))??;
        self.succeed(
            ctx,
            format!("{} entries, {} bytes", archive.entries, archive.file_size),
        );

        ctx.transition(ExportState::Done);
        if let Some(store) = ctx.store.take() {
            if let Err(e) = store.close().await {
                warn!("Failed to close connection: {}", e);
            }
        }

        let summary = ExportSummary {
            destination: archive.path,
            tables: stats.tables,
            written: ctx.written,
            estimate: ctx.estimate,
            archive_bytes: archive.file_size,
            payload_bytes: archive.payload_bytes,
            elapsed: ctx.started.elapsed(),
        };
        info!(
            "Export completed: {} documents, {} bytes, {} ms",
            summary.written,
            summary.archive_bytes,
            summary.elapsed.as_millis()
        );
        Ok(summary)
    }

    /// Pipe every document of the manifest into the archive
    async fn stream(
        &self,
        ctx: &mut ExportContext,
        store: Arc<dyn DocumentStore>,
        manifest: &Manifest,
    ) -> Result<PumpStats> {
        let sink = ctx
            .sink
            .take()
            .ok_or_else(|| ExportError::Internal("archive missing at streaming".to_string()))?;

        // Cancelled by the run's token, or by the writer when it fails
        let stop = self.cancel.child_token();

        let (tx, rx) = mpsc::channel(self.settings.prefetch);
        let writer = ArchiveWriter {
            sink,
            formatter: JsonFormatter::new(self.settings.json_mode, JSON_INDENT),
            id_field: self.settings.id_field.clone(),
            counter: Arc::new(ProgressCounter::new(ctx.estimate)),
            reporter: self.reporter.clone(),
            stop: stop.clone(),
        };
        let writer_task = tokio::task::spawn_blocking(move || writer.run(rx));

        let pumped = streaming::pump(
            store.as_ref(),
            manifest,
            self.settings.stream,
            tx,
            &stop,
        )
        .await;

        let outcome = writer_task
            .await
            .map_err(|e| ExportError::Internal(format!("archive writer failed: {e}")))?;
        ctx.sink = Some(outcome.sink);
        ctx.written = outcome.written;

        // A writer failure is the cause of the producer stopping
        if let Some(e) = outcome.error {
            return Err(e);
        }
        let stats = pumped?;

        if stats.total() != ctx.written {
            return Err(ExportError::Internal(format!(
                "{} document(s) read but {} written",
                stats.total(),
                ctx.written
            )));
        }
        Ok(stats)
    }

    async fn fail(&self, ctx: &mut ExportContext, err: &ExportError) {
        let stage = ctx.state;
        if !stage.is_terminal() {
            ctx.transition(ExportState::Failed);
        }

        if let Some(sink) = ctx.sink.take() {
            let keep_partial = self.settings.keep_partial;
            let path = sink.path().to_path_buf();
            match tokio::task::spawn_blocking(move || sink.abandon(keep_partial)).await {
                Ok(Ok(())) if keep_partial => warn!(
                    "Incomplete archive left at {} ({} document(s))",
                    path.display(),
                    ctx.written
                ),
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to abandon archive {}: {}", path.display(), e),
                Err(e) => warn!("Archive cleanup task failed: {}", e),
            }
        }

        if let Some(store) = ctx.store.take() {
            if let Err(e) = store.close().await {
                warn!("Failed to close connection: {}", e);
            }
        }

        self.reporter.report(ExportEvent::StageFailed {
            stage,
            error: err.to_string(),
        });

        if err.is_cancelled() {
            warn!("Export cancelled during {}", stage);
        } else {
            error!("Export failed during {} ({}): {}", stage, err.kind(), err);
        }
    }

    fn enter(&self, ctx: &mut ExportContext, stage: ExportState) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        ctx.transition(stage);
        self.reporter.report(ExportEvent::StageStarted(stage));
        Ok(())
    }

    fn succeed(&self, ctx: &ExportContext, summary: String) {
        info!("{}: {}", ctx.state, summary);
        self.reporter.report(ExportEvent::StageSucceeded {
            stage: ctx.state,
            summary,
        });
    }

    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExportError::Cancelled),
            result = fut => result,
        }
    }
}

/// Blocking half of the streaming stage
///
/// Sole owner of the archive and the progress counter while streaming.
struct ArchiveWriter {
    sink: ArchiveSink,
    formatter: JsonFormatter,
    id_field: String,
    counter: Arc<ProgressCounter>,
    reporter: Arc<dyn Reporter>,
    stop: CancellationToken,
}

struct WriterOutcome {
    sink: ArchiveSink,
    written: u64,
    error: Option<ExportError>,
}

impl ArchiveWriter {
    /// Write items until the producer hangs up or something fails
    ///
    /// Items already queued when the producer fails are still written.
    fn run(mut self, mut rx: mpsc::Receiver<StreamItem>) -> WriterOutcome {
        let mut table: Option<Arc<TableRef>> = None;
        let mut position = 0u64;

        let error = loop {
            let Some(item) = rx.blocking_recv() else {
                break None;
            };
            if self.stop.is_cancelled() {
                break Some(ExportError::Cancelled);
            }

            match item {
                StreamItem::Table(next) => {
                    debug!("Archiving {}", next);
                    table = Some(next);
                    position = 0;
                }
                StreamItem::Document(doc) => {
                    let Some(current) = table.as_deref() else {
                        break Some(ExportError::Internal(
                            "document received before its table".to_string(),
                        ));
                    };
                    if let Err(e) = self.write(current, position, &doc) {
                        break Some(e);
                    }
                    position += 1;
                    self.counter.increment();
                    self.reporter.report(self.counter.event());
                }
            }
        };

        if error.is_some() {
            // The producer may be waiting on a slow cursor
            self.stop.cancel();
        }

        WriterOutcome {
            written: self.counter.current(),
            sink: self.sink,
            error,
        }
    }

    fn write(&mut self, table: &TableRef, position: u64, doc: &Document) -> Result<()> {
        let id = formatter::document_id(doc, &self.id_field).ok_or_else(|| {
            ArchiveError::MissingDocumentId {
                database: table.database.clone(),
                table: table.table.clone(),
                position,
                field: self.id_field.clone(),
            }
        })?;
        let entry = archive::entry_path(&table.database, &table.table, &id);
        let payload = self.formatter.render(doc, &entry)?;
        self.sink.append(&entry, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::memory::{MemoryConnector, MemoryStore};
    use crate::error::{ConnectionError, CountError};
    use crate::export::progress::{ChannelReporter, NullReporter};
    use crate::export::selection::StaticSelection;
    use mongodb::bson::doc;
    use std::fs::File;
    use std::io::Read;
    use std::path::Path;
    use tempfile::TempDir;

    const FULL_RUN: &[ExportState] = &[
        ExportState::Connecting,
        ExportState::Enumerating,
        ExportState::Estimating,
        ExportState::ChoosingDestination,
        ExportState::Streaming,
        ExportState::Finalizing,
        ExportState::Done,
    ];

    fn shop_store() -> MemoryStore {
        MemoryStore::new()
            .with_table("shop", "orders", 3)
            .with_table("shop", "customers", 2)
            .with_table("logs", "events", 0)
    }

    fn coordinator(
        store: Arc<MemoryStore>,
        databases: &[&str],
        destination: &Path,
        reporter: Arc<dyn Reporter>,
        settings: ExportSettings,
    ) -> ExportCoordinator {
        ExportCoordinator::new(
            Arc::new(MemoryConnector(store)),
            Arc::new(StaticSelection::named(databases.to_vec(), destination)),
            reporter,
            settings,
        )
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        archive.file_names().map(String::from).collect()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ExportEvent>) -> Vec<ExportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Cancels the run once the first document has been written
    struct CancelOnProgress(CancellationToken);

    impl Reporter for CancelOnProgress {
        fn report(&self, event: ExportEvent) {
            if matches!(event, ExportEvent::Progress { .. }) {
                self.0.cancel();
            }
        }
    }

    #[test]
    fn test_state_transitions() {
        for pair in FULL_RUN.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
            assert!(pair[0].can_transition_to(ExportState::Failed));
        }
        assert!(!ExportState::Connecting.can_transition_to(ExportState::Streaming));
        assert!(!ExportState::Done.can_transition_to(ExportState::Failed));
        assert!(!ExportState::Failed.can_transition_to(ExportState::Connecting));
    }

    #[tokio::test]
    async fn test_end_to_end_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(shop_store());
        let (reporter, mut rx) = ChannelReporter::new();

        let mut coordinator = coordinator(
            store.clone(),
            &["shop", "logs"],
            &path,
            Arc::new(reporter),
            ExportSettings::default(),
        );
        let summary = coordinator.run().await.unwrap();

        assert_eq!(summary.estimate, 5);
        assert_eq!(summary.written, 5);
        assert_eq!(summary.destination, path);
        assert_eq!(
            summary.tables,
            vec![
                (TableRef::new("shop", "customers"), 2),
                (TableRef::new("shop", "orders"), 3),
                (TableRef::new("logs", "events"), 0),
            ]
        );
        assert_eq!(coordinator.history(), FULL_RUN);
        assert!(store.is_closed());
        assert_eq!(store.open_cursors(), 0);
        assert_eq!(store.list_database_calls(), 1);
        assert!(summary.payload_bytes > 0);

        let names = entry_names(&path);
        assert_eq!(names.len(), 5);
        assert!(names.iter().all(|n| !n.starts_with("logs/events/")));
        assert!(names.contains(&"shop/orders/orders-0.json".to_string()));
        assert!(names.contains(&"shop/customers/customers-1.json".to_string()));

        let events = drain(&mut rx);
        assert_eq!(
            events.first(),
            Some(&ExportEvent::StageStarted(ExportState::Connecting))
        );
        assert!(matches!(
            events.last(),
            Some(ExportEvent::StageSucceeded {
                stage: ExportState::Finalizing,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_archived_document_is_pretty_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(
            MemoryStore::new()
                .with_documents("shop", "orders", vec![doc! { "_id": "a/1", "total": 10 }]),
        );

        coordinator(
            store,
            &["shop"],
            &path,
            Arc::new(NullReporter),
            ExportSettings::default(),
        )
        .run()
        .await
        .unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut entry = archive.by_name("shop/orders/a%2F1.json").unwrap();
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        assert!(body.starts_with("{\n  \"_id\": \"a/1\""));
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["total"], 10);
    }

    #[tokio::test]
    async fn test_cursor_failure_abandons_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(shop_store().fail_cursor_after("shop", "orders", 2));
        let (reporter, mut rx) = ChannelReporter::new();

        let mut coordinator = coordinator(
            store.clone(),
            &["shop", "logs"],
            &path,
            Arc::new(reporter),
            ExportSettings::default(),
        );
        let err = coordinator.run().await.unwrap_err();

        match &err {
            ExportError::Stream(e) => {
                assert_eq!((e.database.as_str(), e.table.as_str()), ("shop", "orders"));
                assert_eq!(e.position, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.exit_code(), 1);
        assert!(!path.exists());
        assert_eq!(coordinator.history().last(), Some(&ExportState::Failed));
        assert!(store.is_closed());
        assert_eq!(store.open_cursors(), 0);

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(ExportEvent::StageFailed {
                stage: ExportState::Streaming,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_kept_partial_archive_holds_yielded_documents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(shop_store().fail_cursor_after("shop", "orders", 2));
        let settings = ExportSettings {
            keep_partial: true,
            ..Default::default()
        };

        let err = coordinator(store, &["shop"], &path, Arc::new(NullReporter), settings)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Stream(ref e) if e.position == 2));

        let names = entry_names(&path);
        let orders = names.iter().filter(|n| n.starts_with("shop/orders/")).count();
        assert_eq!(orders, 2);
        assert_eq!(names.len(), 4);
    }

    #[tokio::test]
    async fn test_existing_destination_fails_before_streaming() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        std::fs::write(&path, b"precious").unwrap();
        let store = Arc::new(shop_store());

        let mut coordinator = coordinator(
            store.clone(),
            &["shop"],
            &path,
            Arc::new(NullReporter),
            ExportSettings::default(),
        );
        let err = coordinator.run().await.unwrap_err();

        assert!(matches!(
            err,
            ExportError::Archive(ArchiveError::DestinationExists(_))
        ));
        assert_ne!(err.exit_code(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"precious");
        assert_eq!(
            coordinator.history(),
            &[
                ExportState::Connecting,
                ExportState::Enumerating,
                ExportState::Estimating,
                ExportState::ChoosingDestination,
                ExportState::Failed,
            ]
        );
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(shop_store().refuse_connect());

        let mut coordinator = coordinator(
            store,
            &["shop"],
            &path,
            Arc::new(NullReporter),
            ExportSettings::default(),
        );
        let err = coordinator.run().await.unwrap_err();

        assert!(matches!(
            err,
            ExportError::Connection(ConnectionError::ConnectionFailed(_))
        ));
        assert_eq!(
            coordinator.history(),
            &[ExportState::Connecting, ExportState::Failed]
        );
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unknown_database_fails_enumeration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(shop_store());

        let err = coordinator(
            store,
            &["shop", "missing"],
            &path,
            Arc::new(NullReporter),
            ExportSettings::default(),
        )
        .run()
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ExportError::Catalog(CatalogError::UnknownDatabase(_))
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_count_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(shop_store().fail_count("shop", "orders"));

        let err = coordinator(
            store,
            &["shop"],
            &path,
            Arc::new(NullReporter),
            ExportSettings::default(),
        )
        .run()
        .await
        .unwrap_err();

        assert!(matches!(err, ExportError::Count(CountError::CountFailed { .. })));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let token = CancellationToken::new();
        token.cancel();

        let mut coordinator = coordinator(
            Arc::new(shop_store()),
            &["shop"],
            &path,
            Arc::new(NullReporter),
            ExportSettings::default(),
        )
        .with_cancellation(token);
        let err = coordinator.run().await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.exit_code(), 130);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cancelled_while_streaming() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(shop_store());
        let token = CancellationToken::new();

        let mut coordinator = coordinator(
            store.clone(),
            &["shop"],
            &path,
            Arc::new(CancelOnProgress(token.clone())),
            ExportSettings::default(),
        )
        .with_cancellation(token);
        let err = coordinator.run().await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(!path.exists());
        assert!(store.is_closed());
        assert_eq!(store.open_cursors(), 0);
        assert_eq!(coordinator.history().last(), Some(&ExportState::Failed));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_with_stale_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        // Counts lag behind the data: estimate 1 + 2, actual 3 + 2
        let store = Arc::new(shop_store().stale_count("shop", "orders", 1));
        let (reporter, mut rx) = ChannelReporter::new();

        let summary = coordinator(
            store,
            &["shop"],
            &path,
            Arc::new(reporter),
            ExportSettings::default(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(summary.estimate, 3);
        assert_eq!(summary.written, 5);
        assert_eq!(entry_names(&path).len(), 5);

        let mut last = 0;
        for event in drain(&mut rx) {
            if let ExportEvent::Progress { current, total } = event {
                assert!(current > last);
                assert!(current <= total);
                last = current;
            }
        }
        assert_eq!(last, 5);
    }

    #[tokio::test]
    async fn test_counts_above_data_still_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(shop_store().stale_count("shop", "orders", 10));

        let summary = coordinator(
            store,
            &["shop"],
            &path,
            Arc::new(NullReporter),
            ExportSettings::default(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(summary.estimate, 12);
        assert_eq!(summary.written, 5);
    }

    #[tokio::test]
    async fn test_missing_id_is_archive_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(MemoryStore::new().with_documents(
            "shop",
            "orders",
            vec![doc! { "_id": 1 }, doc! { "total": 3 }],
        ));

        let err = coordinator(
            store.clone(),
            &["shop"],
            &path,
            Arc::new(NullReporter),
            ExportSettings::default(),
        )
        .run()
        .await
        .unwrap_err();

        match err {
            ExportError::Archive(ArchiveError::MissingDocumentId {
                table, position, ..
            }) => {
                assert_eq!(table, "orders");
                assert_eq!(position, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!path.exists());
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_writer_failure_stops_producer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let mut docs = vec![doc! { "_id": 1 }, doc! { "_id": 1 }];
        docs.extend((2..50).map(|n| doc! { "_id": n }));
        let store = Arc::new(MemoryStore::new().with_documents("shop", "orders", docs));
        let settings = ExportSettings {
            prefetch: 1,
            ..Default::default()
        };

        let err = coordinator(store.clone(), &["shop"], &path, Arc::new(NullReporter), settings)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExportError::Archive(ArchiveError::WriteFailed { .. })
        ));
        assert_eq!(store.open_cursors(), 0);
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_writer_failure_interrupts_stalled_cursor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(
            MemoryStore::new()
                .with_documents("shop", "a", vec![doc! { "_id": 1 }, doc! { "_id": 1 }])
                .with_table("shop", "b", 3)
                .stall_cursor("shop", "b"),
        );
        let settings = ExportSettings {
            prefetch: 1,
            ..Default::default()
        };

        let mut coordinator =
            coordinator(store.clone(), &["shop"], &path, Arc::new(NullReporter), settings);
        let err = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
            .await
            .expect("export hung on a stalled cursor")
            .unwrap_err();

        assert!(matches!(
            err,
            ExportError::Archive(ArchiveError::WriteFailed { .. })
        ));
        assert!(!path.exists());
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_failed_finalize_leaves_no_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(shop_store());
        let (reporter, mut rx) = ChannelReporter::new();
        let mut settings = ExportSettings::default();
        settings.archive.fail_finalize = true;

        let mut coordinator = coordinator(
            store.clone(),
            &["shop", "logs"],
            &path,
            Arc::new(reporter),
            settings,
        );
        let err = coordinator.run().await.unwrap_err();

        assert!(matches!(
            err,
            ExportError::Archive(ArchiveError::FinalizeFailed(_))
        ));
        assert_eq!(err.exit_code(), 1);
        assert!(!path.exists());
        assert!(store.is_closed());
        assert_eq!(
            &coordinator.history()[coordinator.history().len() - 2..],
            &[ExportState::Finalizing, ExportState::Failed]
        );

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(ExportEvent::StageFailed {
                stage: ExportState::Finalizing,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_uncompressed_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let config = ExportConfig {
            compression_level: 0,
            ..Default::default()
        };

        let summary = coordinator(
            Arc::new(shop_store()),
            &["shop"],
            &path,
            Arc::new(NullReporter),
            ExportSettings::from_config(&config),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(summary.written, 5);
        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(
            archive.by_index(0).unwrap().compression(),
            zip::CompressionMethod::Stored
        );
    }

    #[tokio::test]
    async fn test_custom_id_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        let store = Arc::new(MemoryStore::new().with_documents(
            "shop",
            "orders",
            vec![doc! { "_id": 1, "sku": "A-1" }],
        ));
        let settings = ExportSettings {
            id_field: "sku".to_string(),
            ..Default::default()
        };

        coordinator(store, &["shop"], &path, Arc::new(NullReporter), settings)
            .run()
            .await
            .unwrap();
        assert_eq!(entry_names(&path), vec!["shop/orders/A-1.json"]);
    }

    #[test]
    fn test_settings_from_config() {
        let config = ExportConfig {
            prefetch: 0,
            read_timeout: 5,
            overwrite: true,
            ..Default::default()
        };
        let settings = ExportSettings::from_config(&config);
        assert_eq!(settings.prefetch, 1);
        assert_eq!(settings.stream.read_timeout, Some(Duration::from_secs(5)));
        assert!(settings.archive.overwrite);
        assert_eq!(settings.id_field, "_id");
    }
}
