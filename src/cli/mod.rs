//! Command-line interface for docdump
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and CLI overrides
//! - Connection string assembly
//! - Wiring the export ports (connection, selection, reporting)

pub mod prompt;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::{Config, JsonMode, LogLevel};
use crate::connection::{Connector, MongoConnector, sanitize_uri};
use crate::error::{ConfigError, Result};
use crate::export::{
    ConsoleReporter, DatabaseChoice, ExportSettings, Reporter, Selector, StaticSelection,
};

use self::prompt::PromptSelection;

/// Export MongoDB databases into a ZIP archive of JSON documents
#[derive(Parser, Debug)]
#[command(
    name = "docdump",
    version,
    about = "Export MongoDB databases into a ZIP archive of JSON documents",
    long_about = "Streams every document of the selected databases into a single ZIP archive,
one pretty-printed JSON file per document at {database}/{collection}/{id}.json."
)]
pub struct CliArgs {
    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(value_name = "URI")]
    pub uri: Option<String>,

    /// Server to connect to
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to connect to
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Username for authentication
    #[arg(short = 'u', long, value_name = "USERNAME")]
    pub username: Option<String>,

    /// Password for authentication
    #[arg(short = 'p', long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Authentication database
    #[arg(long, value_name = "NAME", default_value = "admin")]
    pub auth_database: String,

    /// Database to export (repeatable)
    #[arg(short = 'd', long = "database", value_name = "NAME", conflicts_with = "all")]
    pub databases: Vec<String>,

    /// Export every database except admin, config and local
    #[arg(long)]
    pub all: bool,

    /// Archive path
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Replace the archive if it already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Keep the incomplete archive when the export fails
    #[arg(long)]
    pub keep_partial: bool,

    /// JSON flavour (relaxed, canonical, simplified)
    #[arg(long, value_name = "MODE")]
    pub json_mode: Option<String>,

    /// Documents fetched per cursor round trip
    #[arg(long, value_name = "N")]
    pub batch_size: Option<u32>,

    /// Documents in flight between cursor and archive
    #[arg(long, value_name = "N")]
    pub prefetch: Option<usize>,

    /// Count documents exactly instead of using collection metadata
    #[arg(long)]
    pub exact_counts: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for docdump
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Configuration with CLI overrides applied
    config: Config,
}

impl CliInterface {
    /// Parse arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, &args)?;
        Ok(Self { args, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Get the MongoDB connection URI
    ///
    /// Priority:
    /// 1. Explicit URI argument
    /// 2. Built from --host/--port/--username
    /// 3. Configured URI (file or DOCDUMP_URI)
    pub fn get_connection_uri(&self) -> String {
        if let Some(uri) = &self.args.uri {
            return uri.clone();
        }
        if self.args.host.is_some() || self.args.port.is_some() || self.args.username.is_some() {
            return self.build_connection_uri();
        }
        self.config.connection.uri.clone()
    }

    /// Build connection URI from individual arguments
    ///
    /// `mongodb://[username:password@]host:port[/?authSource=db]`
    fn build_connection_uri(&self) -> String {
        let mut uri = String::from("mongodb://");

        if let Some(username) = &self.args.username {
            uri.push_str(username);
            if let Some(password) = &self.args.password {
                uri.push(':');
                uri.push_str(password);
            }
            uri.push('@');
        }

        let host = self.args.host.as_deref().unwrap_or("localhost");
        uri.push_str(host);
        uri.push(':');
        uri.push_str(&self.args.port.unwrap_or(27017).to_string());

        if self.args.username.is_some() {
            uri.push_str("/?authSource=");
            uri.push_str(&self.args.auth_database);
        }

        uri
    }

    /// Databases chosen on the command line, if any
    pub fn database_choice(&self) -> Option<DatabaseChoice> {
        if self.args.all {
            Some(DatabaseChoice::All)
        } else if !self.args.databases.is_empty() {
            Some(DatabaseChoice::Named(self.args.databases.clone()))
        } else {
            None
        }
    }

    /// Connection port
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MongoConnector::new(
            self.get_connection_uri(),
            self.config.connection.clone(),
            self.config.export.exact_counts,
        ))
    }

    /// Selection port
    ///
    /// Prompts on the terminal for anything missing from the command line.
    /// Without a terminal, missing databases make enumeration fail and a
    /// missing output falls back to a timestamped file name.
    pub fn selector(&self) -> Arc<dyn Selector> {
        let databases = self.database_choice();
        let output = self.args.output.clone();

        if std::io::stdin().is_terminal() {
            return Arc::new(PromptSelection::new(databases, output));
        }
        Arc::new(StaticSelection::new(
            databases.unwrap_or(DatabaseChoice::Named(Vec::new())),
            output,
        ))
    }

    /// Reporting port
    pub fn reporter(&self) -> Arc<dyn Reporter> {
        let enabled = self.config.display.progress && std::io::stderr().is_terminal();
        Arc::new(ConsoleReporter::new(enabled))
    }

    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings::from_config(&self.config.export)
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) -> Result<()> {
        Self::apply_logging_args(config, args);
        Self::apply_connection_args(config, args);
        Self::apply_export_args(config, args)?;
        if args.no_progress || args.quiet {
            config.display.progress = false;
        }
        Ok(())
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
    }

    fn apply_export_args(config: &mut Config, args: &CliArgs) -> Result<()> {
        let export = &mut config.export;
        if let Some(mode) = &args.json_mode {
            export.json_mode = JsonMode::parse(mode).ok_or_else(|| ConfigError::InvalidValue {
                field: "--json-mode".to_string(),
                value: mode.clone(),
            })?;
        }
        if let Some(batch_size) = args.batch_size {
            export.batch_size = batch_size;
        }
        if let Some(prefetch) = args.prefetch {
            export.prefetch = prefetch;
        }
        export.exact_counts |= args.exact_counts;
        export.overwrite |= args.overwrite;
        export.keep_partial |= args.keep_partial;
        Ok(())
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if a subcommand was handled, false to export
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                self.show_version();
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                if *validate {
                    self.validate_config_file();
                }
                if *show || !*validate {
                    self.show_config()?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn show_version(&self) {
        println!("docdump version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    fn validate_config_file(&self) {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("❌ Configuration file does not exist");
            return;
        }

        match Config::from_file(&path) {
            Ok(config) => match config.validate() {
                Ok(()) => println!("✅ Configuration is valid"),
                Err(e) => println!("❌ Configuration validation failed: {}", e),
            },
            Err(e) => println!("❌ Failed to load configuration: {}", e),
        }
    }

    fn show_config(&self) -> Result<()> {
        println!("# Configuration file: {}", self.get_config_path().display());
        println!("# Effective configuration (file, environment and flags)");
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path)
    }

    /// Print the connection target unless quiet
    pub fn print_banner(&self) {
        if !self.args.quiet {
            eprintln!("Connecting to: {}", sanitize_uri(&self.get_connection_uri()));
        }
    }
}
