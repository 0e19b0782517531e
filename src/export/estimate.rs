//! Size estimation
//!
//! Sums per-table document counts to size the progress bar. The total is
//! advisory: streaming iterates live cursors and never trusts it as a bound.

use tracing::debug;

use super::catalog::Manifest;
use crate::connection::DocumentStore;
use crate::error::{CountError, Result};

/// Total number of documents across every table of the manifest
///
/// Any failed count aborts the estimate; a partial total is never returned.
pub async fn estimate(store: &dyn DocumentStore, manifest: &Manifest) -> Result<u64> {
    let mut total: u64 = 0;

    for table in manifest.tables() {
        let count = store
            .count(&table.database, &table.table)
            .await
            .map_err(|e| CountError::CountFailed {
                database: table.database.clone(),
                table: table.table.clone(),
                reason: e.to_string(),
            })?;
        debug!("{}: {} document(s)", table, count);
        total = total.saturating_add(count);
    }

    Ok(total)
}
