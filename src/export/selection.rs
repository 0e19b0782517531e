//! Selection port
//!
//! Decides which databases are exported and where the archive goes. The
//! interactive implementation lives in the CLI; [`StaticSelection`] carries
//! decisions made up front on the command line.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;

use super::catalog::Manifest;
use crate::error::Result;

/// Databases that hold server state rather than user data
pub const SERVER_DATABASES: &[&str] = &["admin", "config", "local"];

/// Operator decisions needed by the coordinator
#[async_trait]
pub trait Selector: Send + Sync {
    /// Pick the databases to export from those the server lists
    async fn choose_databases(&self, available: &[String]) -> Result<Vec<String>>;

    /// Pick the archive path once the job is sized
    async fn choose_destination(&self, manifest: &Manifest, estimate: u64) -> Result<PathBuf>;
}

/// Which databases a non-interactive run exports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseChoice {
    /// Every database except the server's own
    All,
    Named(Vec<String>),
}

/// Decisions fixed before the run starts
#[derive(Debug, Clone)]
pub struct StaticSelection {
    databases: DatabaseChoice,
    destination: Option<PathBuf>,
}

impl StaticSelection {
    pub fn new(databases: DatabaseChoice, destination: Option<PathBuf>) -> Self {
        Self {
            databases,
            destination,
        }
    }

    pub fn named<I, S>(databases: I, destination: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            databases: DatabaseChoice::Named(databases.into_iter().map(Into::into).collect()),
            destination: Some(destination.into()),
        }
    }
}

#[async_trait]
impl Selector for StaticSelection {
    async fn choose_databases(&self, available: &[String]) -> Result<Vec<String>> {
        Ok(match &self.databases {
            DatabaseChoice::All => user_databases(available),
            DatabaseChoice::Named(names) => names.clone(),
        })
    }

    async fn choose_destination(&self, _manifest: &Manifest, _estimate: u64) -> Result<PathBuf> {
        Ok(self.destination.clone().unwrap_or_else(default_destination))
    }
}

/// Available databases minus the server's own
pub fn user_databases(available: &[String]) -> Vec<String> {
    available
        .iter()
        .filter(|name| !SERVER_DATABASES.contains(&name.as_str()))
        .cloned()
        .collect()
}

/// `export-YYYY-MM-DD_HH-MM-SS.zip` in the working directory
pub fn default_destination() -> PathBuf {
    PathBuf::from(format!(
        "export-{}.zip",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available() -> Vec<String> {
        ["admin", "config", "local", "logs", "shop"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_all_skips_server_databases() {
        let selection = StaticSelection::new(DatabaseChoice::All, None);
        let chosen = selection.choose_databases(&available()).await.unwrap();
        assert_eq!(chosen, vec!["logs", "shop"]);
    }

    #[tokio::test]
    async fn test_named_is_passed_through() {
        let selection = StaticSelection::named(["shop", "admin"], "out.zip");
        let chosen = selection.choose_databases(&available()).await.unwrap();
        assert_eq!(chosen, vec!["shop", "admin"]);

        let path = selection
            .choose_destination(&Manifest::default(), 0)
            .await
            .unwrap();
        assert_eq!(path, PathBuf::from("out.zip"));
    }

    #[tokio::test]
    async fn test_missing_destination_uses_default() {
        let selection = StaticSelection::new(DatabaseChoice::All, None);
        let path = selection
            .choose_destination(&Manifest::default(), 0)
            .await
            .unwrap();
        let name = path.to_string_lossy().to_string();
        assert!(name.starts_with("export-"));
        assert!(name.ends_with(".zip"));
        assert_eq!(name.len(), "export-2024-01-01_00-00-00.zip".len());
    }
}
