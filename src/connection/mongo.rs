//! MongoDB implementation of the connection port
//!
//! This module provides:
//! - Connection establishment with retries and a ping health check
//! - Database and collection listing
//! - Estimated or exact document counts
//! - Find cursors exposed as lazy document streams

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{Document, doc};
use mongodb::{Client, options::ClientOptions};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{Connector, DocumentCursor, DocumentStore};
use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, ExportError, Result, mongo};

/// State of a [`MongoStore`] session
///
/// A store only exists once the connection has been established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected and ready
    Connected,

    /// Closed; every further call fails with `NotConnected`
    Disconnected,
}

/// Builds [`MongoStore`] sessions from a URI and connection settings
pub struct MongoConnector {
    /// Connection URI
    uri: String,

    /// Connection configuration
    config: ConnectionConfig,

    /// Use `countDocuments` instead of collection metadata
    exact_counts: bool,
}

impl MongoConnector {
    /// Create a new connector
    ///
    /// # Arguments
    /// * `uri` - MongoDB connection URI
    /// * `config` - Connection configuration
    /// * `exact_counts` - Count documents exactly instead of estimating
    pub fn new(uri: String, config: ConnectionConfig, exact_counts: bool) -> Self {
        Self {
            uri,
            config,
            exact_counts,
        }
    }

    /// Parse connection URI and create client options
    async fn parse_uri(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| ConnectionError::InvalidUri(mongo::describe(&e)))?;

        let timeout = Duration::from_secs(self.config.timeout);
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        if options.app_name.is_none() {
            options.app_name = Some(self.config.app_name.clone());
        }
        Ok(options)
    }

    /// Attempt connection with retries
    ///
    /// Only transient failures (network, server selection) are retried.
    async fn connect_with_retry(&self, options: ClientOptions) -> Result<(Client, String)> {
        let attempts = self.config.retry_attempts + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("Connecting to MongoDB (attempt {}/{})", attempt, attempts);

            let client = Client::with_options(options.clone())
                .map_err(|e| ConnectionError::ConnectionFailed(mongo::describe(&e)))?;

            match ping(&client).await {
                Ok(version) => return Ok((client, version)),
                Err(e) if mongo::is_transient(&e) && attempt < attempts => {
                    warn!(
                        "Connection attempt {} failed: {}, retrying",
                        attempt,
                        mongo::describe(&e)
                    );
                    tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                    last_error = Some(e);
                }
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        Err(match last_error {
            Some(e) if matches!(e.kind.as_ref(), mongodb::error::ErrorKind::ServerSelection { .. }) => {
                warn!("Server selection failed: {}", mongo::describe(&e));
                ConnectionError::Timeout
            }
            Some(e) => ConnectionError::PingFailed(mongo::describe(&e)),
            None => ConnectionError::NotConnected,
        }
        .into())
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        let options = self.parse_uri().await?;
        let (client, server_version) = self.connect_with_retry(options).await?;

        info!(
            "Connected to {} (MongoDB {})",
            sanitize_uri(&self.uri),
            server_version
        );

        Ok(Arc::new(MongoStore {
            client,
            server_version,
            uri: sanitize_uri(&self.uri),
            exact_counts: self.exact_counts,
            state: Arc::new(RwLock::new(ConnectionState::Connected)),
        }))
    }
}

/// A connected MongoDB session
pub struct MongoStore {
    /// MongoDB client instance
    client: Client,

    /// Server version reported by `buildInfo`
    server_version: String,

    /// Connection URI with credentials hidden
    uri: String,

    /// Use `countDocuments` instead of collection metadata
    exact_counts: bool,

    /// Current connection state
    state: Arc<RwLock<ConnectionState>>,
}

impl MongoStore {
    /// Get current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn ensure_connected(&self) -> Result<()> {
        match self.state().await {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected => Err(ConnectionError::NotConnected.into()),
        }
    }

    async fn set_state(&self, new_state: ConnectionState) {
        *self.state.write().await = new_state;
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn describe(&self) -> String {
        format!("{} (MongoDB {})", self.uri, self.server_version)
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.ensure_connected().await?;
        Ok(self.client.list_database_names().await?)
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.ensure_connected().await?;
        Ok(self.client.database(database).list_collection_names().await?)
    }

    async fn count(&self, database: &str, table: &str) -> Result<u64> {
        self.ensure_connected().await?;
        let collection = self.client.database(database).collection::<Document>(table);
        let count = if self.exact_counts {
            collection.count_documents(doc! {}).await?
        } else {
            collection.estimated_document_count().await?
        };
        Ok(count)
    }

    async fn open_cursor(
        &self,
        database: &str,
        table: &str,
        batch_size: u32,
    ) -> Result<DocumentCursor> {
        self.ensure_connected().await?;
        let cursor = self
            .client
            .database(database)
            .collection::<Document>(table)
            .find(doc! {})
            .batch_size(batch_size)
            .await?;
        Ok(cursor.map_err(ExportError::from).boxed())
    }

    async fn close(&self) -> Result<()> {
        if self.state().await == ConnectionState::Disconnected {
            return Ok(());
        }
        self.set_state(ConnectionState::Disconnected).await;
        self.client.clone().shutdown().await;
        debug!("Closed MongoDB session to {}", self.uri);
        Ok(())
    }
}

/// Verify the server is alive and return its version
async fn ping(client: &Client) -> mongodb::error::Result<String> {
    let admin = client.database("admin");
    admin.run_command(doc! { "ping": 1 }).await?;
    let build_info = admin.run_command(doc! { "buildInfo": 1 }).await?;
    Ok(build_info
        .get_str("version")
        .unwrap_or("unknown")
        .to_string())
}

/// Hide credentials in a connection URI
///
/// Everything between the scheme and the last `@` is replaced by `***`.
pub fn sanitize_uri(uri: &str) -> String {
    if let Some(proto_end) = uri.find("://") {
        if let Some(host_start) = uri.rfind('@') {
            if host_start > proto_end {
                let proto = &uri[..proto_end + 3];
                let host = &uri[host_start..];
                return format!("{}***{}", proto, host);
            }
        }
    }
    if uri.contains('@') {
        "mongodb://***".to_string()
    } else {
        uri.to_string()
    }
}
