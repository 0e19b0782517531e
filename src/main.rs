//! docdump
//!
//! Exports MongoDB databases into a single ZIP archive, one pretty JSON
//! file per document.
//!
//! # Usage
//!
//! ```bash
//! # Interactive: pick databases and destination on the terminal
//! docdump mongodb://localhost:27017
//!
//! # Scripted
//! docdump mongodb://localhost:27017 -d shop -d logs -o shop.zip
//! ```

use docdump::cli::CliInterface;
use docdump::error::Result;
use docdump::export::ExportCoordinator;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Application entry point
#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or run the export
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    cli.config().validate()?;
    cli.print_banner();

    let cancel = CancellationToken::new();
    let ctrl_c_handle = spawn_ctrl_c_handler(cancel.clone());

    let mut coordinator = ExportCoordinator::new(
        cli.connector(),
        cli.selector(),
        cli.reporter(),
        cli.export_settings(),
    )
    .with_cancellation(cancel);

    let result = coordinator.run().await;
    ctrl_c_handle.abort();

    let summary = result?;
    if !cli.args().quiet {
        println!("{}", summary);
    }
    Ok(())
}

/// Cancel the export on Ctrl+C
fn spawn_ctrl_c_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, cancelling export");
                cancel.cancel();
            }
            Err(err) => {
                eprintln!("Failed to listen for Ctrl+C: {}", err);
            }
        }
    })
}

/// Initialize logging on stderr
///
/// `RUST_LOG` wins over the configured level.
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
