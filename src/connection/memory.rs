//! In-memory document store with fault injection, for tests

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use mongodb::bson::{Document, doc};

use super::{Connector, DocumentCursor, DocumentStore};
use crate::error::{ConnectionError, ExportError, Result};

type Tables = Vec<(String, Vec<Document>)>;

/// Databases, tables and documents held in memory
#[derive(Default)]
pub struct MemoryStore {
    databases: Vec<(String, Tables)>,
    /// Cursor on (database, table) fails after yielding N documents
    fail_cursor_after: HashMap<(String, String), usize>,
    /// Cursor on (database, table) never yields
    stalled: HashSet<(String, String)>,
    fail_list_tables: HashSet<String>,
    fail_count: HashSet<(String, String)>,
    /// Count reported for a table instead of its real size
    stale_counts: HashMap<(String, String), u64>,
    refuse_connect: bool,
    list_database_calls: AtomicUsize,
    open_cursors: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table holding `count` documents with ids `{table}-{n}`
    pub fn with_table(self, database: &str, table: &str, count: usize) -> Self {
        let docs = (0..count)
            .map(|n| doc! { "_id": format!("{table}-{n}"), "n": n as i64 })
            .collect();
        self.with_documents(database, table, docs)
    }

    pub fn with_documents(mut self, database: &str, table: &str, docs: Vec<Document>) -> Self {
        match self.databases.iter_mut().find(|(name, _)| name == database) {
            Some((_, tables)) => tables.push((table.to_string(), docs)),
            None => self
                .databases
                .push((database.to_string(), vec![(table.to_string(), docs)])),
        }
        self
    }

    pub fn with_empty_database(mut self, database: &str) -> Self {
        self.databases.push((database.to_string(), Vec::new()));
        self
    }

    pub fn fail_cursor_after(mut self, database: &str, table: &str, n: usize) -> Self {
        self.fail_cursor_after
            .insert((database.to_string(), table.to_string()), n);
        self
    }

    pub fn stall_cursor(mut self, database: &str, table: &str) -> Self {
        self.stalled
            .insert((database.to_string(), table.to_string()));
        self
    }

    pub fn fail_list_tables(mut self, database: &str) -> Self {
        self.fail_list_tables.insert(database.to_string());
        self
    }

    pub fn fail_count(mut self, database: &str, table: &str) -> Self {
        self.fail_count
            .insert((database.to_string(), table.to_string()));
        self
    }

    pub fn stale_count(mut self, database: &str, table: &str, count: u64) -> Self {
        self.stale_counts
            .insert((database.to_string(), table.to_string()), count);
        self
    }

    pub fn refuse_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Times the database list was fetched
    pub fn list_database_calls(&self) -> usize {
        self.list_database_calls.load(Ordering::SeqCst)
    }

    /// Cursors opened and not yet dropped
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn table(&self, database: &str, table: &str) -> Option<&Vec<Document>> {
        self.databases
            .iter()
            .find(|(name, _)| name == database)
            .and_then(|(_, tables)| tables.iter().find(|(name, _)| name == table))
            .map(|(_, docs)| docs)
    }
}

/// Decrements the open cursor gauge when the cursor stream is dropped
struct CursorGuard(Arc<AtomicUsize>);

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn describe(&self) -> String {
        "memory://test".to_string()
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.list_database_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.databases.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        if self.fail_list_tables.contains(database) {
            return Err(ConnectionError::Disconnected.into());
        }
        Ok(self
            .databases
            .iter()
            .find(|(name, _)| name == database)
            .map(|(_, tables)| tables.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    async fn count(&self, database: &str, table: &str) -> Result<u64> {
        let key = (database.to_string(), table.to_string());
        if self.fail_count.contains(&key) {
            return Err(ConnectionError::Disconnected.into());
        }
        if let Some(stale) = self.stale_counts.get(&key) {
            return Ok(*stale);
        }
        Ok(self.table(database, table).map(|d| d.len() as u64).unwrap_or(0))
    }

    async fn open_cursor(
        &self,
        database: &str,
        table: &str,
        _batch_size: u32,
    ) -> Result<DocumentCursor> {
        let docs = self.table(database, table).cloned().unwrap_or_default();
        let fail_after = self
            .fail_cursor_after
            .get(&(database.to_string(), table.to_string()))
            .copied();

        let items: Vec<Result<Document>> = match fail_after {
            Some(n) => {
                let mut items: Vec<Result<Document>> =
                    docs.into_iter().take(n).map(Ok).collect();
                items.push(Err(ExportError::Connection(ConnectionError::Disconnected)));
                items
            }
            None => docs.into_iter().map(Ok).collect(),
        };

        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        let guard = CursorGuard(self.open_cursors.clone());

        if self.stalled.contains(&(database.to_string(), table.to_string())) {
            let stream = futures::stream::pending::<Result<Document>>().map(move |item| {
                let _guard = &guard;
                item
            });
            return Ok(stream.boxed());
        }

        let stream = futures::stream::iter(items).map(move |item| {
            let _guard = &guard;
            item
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out the same shared store on every connect
pub struct MemoryConnector(pub Arc<MemoryStore>);

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        if self.0.refuse_connect {
            return Err(ConnectionError::ConnectionFailed("connection refused".into()).into());
        }
        Ok(self.0.clone())
    }
}
