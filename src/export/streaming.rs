//! Document stream source
//!
//! A [`TableStream`] wraps one server-side cursor and yields documents on
//! demand. [`pump`] walks the manifest table by table and pushes documents
//! into the bounded pipeline channel, so at most `prefetch` documents are
//! ever held between the cursor and the archive writer.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use mongodb::bson::Document;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::catalog::{Manifest, TableRef};
use crate::connection::{DocumentCursor, DocumentStore};
use crate::error::{ExportError, Result, StreamError};

/// Cursor settings
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Documents fetched per cursor round trip
    pub batch_size: u32,
    /// Give up on a cursor read after this long
    pub read_timeout: Option<Duration>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            read_timeout: None,
        }
    }
}

/// Item flowing from the cursor side to the archive writer
#[derive(Debug)]
pub enum StreamItem {
    /// Following documents belong to this table
    Table(Arc<TableRef>),
    /// Next document of the current table
    Document(Document),
}

/// Lazy, single-pass sequence over one table
///
/// The cursor is released when the sequence is exhausted, fails, is closed
/// explicitly, or is dropped.
pub struct TableStream {
    table: TableRef,
    cursor: Option<DocumentCursor>,
    position: u64,
    read_timeout: Option<Duration>,
}

impl TableStream {
    /// Open a cursor over every document of `table`
    ///
    /// An open failure is a [`StreamError`] at position 0.
    pub async fn open(
        store: &dyn DocumentStore,
        table: TableRef,
        options: StreamOptions,
    ) -> Result<Self> {
        let cursor = store
            .open_cursor(&table.database, &table.table, options.batch_size)
            .await
            .map_err(|e| StreamError::new(&table.database, &table.table, 0, e.to_string()))?;

        debug!("Opened cursor over {}", table);

        Ok(Self {
            table,
            cursor: Some(cursor),
            position: 0,
            read_timeout: options.read_timeout,
        })
    }

    /// Fetch the next document
    ///
    /// # Returns
    /// * `Ok(Some(doc))` - next document
    /// * `Ok(None)` - table exhausted (or stream closed)
    /// * `Err(StreamError)` - cursor failed after `position()` documents
    pub async fn next(&mut self) -> Result<Option<Document>> {
        let cursor = match self.cursor.as_mut() {
            Some(c) => c,
            None => return Ok(None),
        };

        let next = match self.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, cursor.next()).await {
                Ok(next) => next,
                Err(_) => {
                    self.cursor = None;
                    return Err(self.failure(format!("no response within {limit:?}")));
                }
            },
            None => cursor.next().await,
        };

        match next {
            Some(Ok(doc)) => {
                self.position += 1;
                Ok(Some(doc))
            }
            Some(Err(e)) => {
                // Release the cursor; the sequence is not restartable
                self.cursor = None;
                Err(self.failure(e.to_string()))
            }
            None => {
                debug!(
                    "Cursor over {} exhausted after {} documents",
                    self.table, self.position
                );
                self.cursor = None;
                Ok(None)
            }
        }
    }

    /// Documents yielded so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    /// Release the cursor before the table is exhausted
    pub fn close(&mut self) {
        if self.cursor.take().is_some() {
            debug!(
                "Closed cursor over {} after {} documents",
                self.table, self.position
            );
        }
    }

    fn failure(&self, reason: String) -> ExportError {
        StreamError::new(
            &self.table.database,
            &self.table.table,
            self.position,
            reason,
        )
        .into()
    }
}

impl Drop for TableStream {
    fn drop(&mut self) {
        if self.cursor.is_some() {
            debug!("TableStream over {} dropped without explicit close", self.table);
        }
    }
}

/// Per-table document counts observed during iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub tables: Vec<(TableRef, u64)>,
}

impl PumpStats {
    /// Documents observed across all tables
    pub fn total(&self) -> u64 {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

/// Stream every table of the manifest into `tx`, in manifest order
///
/// Each table is announced with [`StreamItem::Table`] before its documents.
/// Stops at the first cursor failure, on cancellation, or when the
/// receiving side goes away.
pub async fn pump(
    store: &dyn DocumentStore,
    manifest: &Manifest,
    options: StreamOptions,
    tx: mpsc::Sender<StreamItem>,
    cancel: &CancellationToken,
) -> Result<PumpStats> {
    let mut stats = PumpStats::default();

    for table in manifest.tables() {
        send(&tx, StreamItem::Table(Arc::new(table.clone())), cancel).await?;

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
            opened = TableStream::open(store, table.clone(), options) => opened?,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ExportError::Cancelled),
                next = stream.next() => next?,
            };
            match next {
                Some(doc) => send(&tx, StreamItem::Document(doc), cancel).await?,
                None => break,
            }
        }

        info!("Streamed {} document(s) from {}", stream.position(), table);
        stats.tables.push((table, stream.position()));
    }

    Ok(stats)
}

async fn send(
    tx: &mpsc::Sender<StreamItem>,
    item: StreamItem,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExportError::Cancelled),
        sent = tx.send(item) => sent.map_err(|_| {
            ExportError::Internal("archive writer stopped accepting documents".to_string())
        }),
    }
}
