//! Catalog enumeration
//!
//! Turns the selected database names into a [`Manifest`]: every database
//! with its ordered list of tables. Enumeration is all-or-nothing.

use std::fmt;

use tracing::{debug, info};

use crate::connection::DocumentStore;
use crate::error::{CatalogError, Result};

/// Characters MongoDB rejects in database names
const INVALID_DATABASE_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '*', '<', '>', ':', '|', '?', '\0'];

/// A (database, table) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl TableRef {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// One database and its tables, in export order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTables {
    pub name: String,
    pub tables: Vec<String>,
}

/// Database name → ordered table names
///
/// Databases keep the order in which they were selected. Built once, then
/// read-only for the rest of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    databases: Vec<DatabaseTables>,
}

impl Manifest {
    /// Build a manifest from already-enumerated parts
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: Into<String>,
    {
        Self {
            databases: parts
                .into_iter()
                .map(|(name, tables)| DatabaseTables {
                    name: name.into(),
                    tables: tables.into_iter().map(Into::into).collect(),
                })
                .collect(),
        }
    }

    pub fn databases(&self) -> &[DatabaseTables] {
        &self.databases
    }

    /// Every (database, table) pair in export order
    pub fn tables(&self) -> impl Iterator<Item = TableRef> + '_ {
        self.databases.iter().flat_map(|db| {
            db.tables
                .iter()
                .map(move |table| TableRef::new(db.name.clone(), table.clone()))
        })
    }

    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    pub fn table_count(&self) -> usize {
        self.databases.iter().map(|db| db.tables.len()).sum()
    }

    pub fn contains_database(&self, name: &str) -> bool {
        self.databases.iter().any(|db| db.name == name)
    }
}

/// Options controlling which tables are listed
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogOptions {
    /// Keep `system.*` collections
    pub include_system: bool,
}

/// Check a database name against MongoDB's naming rules
pub fn validate_database_name(name: &str) -> std::result::Result<(), CatalogError> {
    if name.is_empty() || name.len() > 63 || name.contains(INVALID_DATABASE_CHARS) {
        return Err(CatalogError::InvalidDatabase(name.to_string()));
    }
    Ok(())
}

/// List the tables of every selected database
///
/// `available` is the database list the selection was made from.
/// Duplicate names in `selection` are collapsed (first occurrence wins).
/// Fails without returning a partial manifest if any name is invalid or
/// unknown, or if any listing call fails.
pub async fn enumerate(
    store: &dyn DocumentStore,
    available: &[String],
    selection: &[String],
    options: CatalogOptions,
) -> Result<Manifest> {
    let mut selected: Vec<&str> = Vec::with_capacity(selection.len());
    for name in selection {
        if !selected.contains(&name.as_str()) {
            selected.push(name.as_str());
        }
    }
    if selected.is_empty() {
        return Err(CatalogError::EmptySelection.into());
    }
    for name in &selected {
        validate_database_name(name)?;
    }

    if let Some(missing) = selected.iter().find(|name| !available.iter().any(|a| a == *name)) {
        return Err(CatalogError::UnknownDatabase(missing.to_string()).into());
    }

    let mut databases = Vec::with_capacity(selected.len());
    for name in selected {
        let mut tables = store
            .list_tables(name)
            .await
            .map_err(|e| CatalogError::ListTablesFailed {
                database: name.to_string(),
                reason: e.to_string(),
            })?;

        let listed = tables.len();
        if !options.include_system {
            tables.retain(|t| !t.starts_with("system."));
        }
        tables.sort();
        debug!(
            "Database '{}': {} table(s) ({} listed)",
            name,
            tables.len(),
            listed
        );

        databases.push(DatabaseTables {
            name: name.to_string(),
            tables,
        });
    }

    let manifest = Manifest { databases };
    info!(
        "Enumerated {} table(s) in {} database(s)",
        manifest.table_count(),
        manifest.database_count()
    );
    Ok(manifest)
}
