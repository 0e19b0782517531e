//! Progress reporting for export runs
//!
//! The coordinator describes what it is doing through [`ExportEvent`]s sent
//! to a [`Reporter`]. Reporters must not block: events are emitted from the
//! archive writer between entries.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;

use super::coordinator::ExportState;

/// Something the coordinator wants the operator to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    StageStarted(ExportState),
    StageSucceeded { stage: ExportState, summary: String },
    StageFailed { stage: ExportState, error: String },
    /// `current <= total` always holds
    Progress { current: u64, total: u64 },
}

/// Reporting port
pub trait Reporter: Send + Sync {
    fn report(&self, event: ExportEvent);
}

/// Documents written so far, against the estimated total
///
/// Only the archive writer increments it.
#[derive(Debug)]
pub struct ProgressCounter {
    written: AtomicU64,
    estimate: u64,
}

impl ProgressCounter {
    pub fn new(estimate: u64) -> Self {
        Self {
            written: AtomicU64::new(0),
            estimate,
        }
    }

    /// Count one written document and return the new total
    pub fn increment(&self) -> u64 {
        self.written.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn current(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn estimate(&self) -> u64 {
        self.estimate
    }

    /// Denominator to display: the estimate, raised to the current count
    /// when the tables grew after counting
    pub fn total(&self) -> u64 {
        self.estimate.max(self.current())
    }

    /// Progress event for the current state of the counter
    pub fn event(&self) -> ExportEvent {
        let current = self.current();
        ExportEvent::Progress {
            current,
            total: self.estimate.max(current),
        }
    }
}

/// Drops every event
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: ExportEvent) {}
}

/// Forwards events to an unbounded channel
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ExportEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Reporter for ChannelReporter {
    fn report(&self, event: ExportEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

/// Terminal reporter: a spinner per stage and a bar while streaming
pub struct ConsoleReporter {
    enabled: bool,
    current: Mutex<Option<ProgressBar>>,
    started: Mutex<Option<Instant>>,
}

impl ConsoleReporter {
    /// Create a console reporter
    ///
    /// # Arguments
    /// * `enabled` - Draw spinners and bars on stderr; when false the
    ///   reporter stays silent
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            current: Mutex::new(None),
            started: Mutex::new(None),
        }
    }

    fn target(&self) -> ProgressDrawTarget {
        if self.enabled {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        }
    }

    fn spinner(&self, stage: ExportState) -> ProgressBar {
        let bar = ProgressBar::with_draw_target(None, self.target());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("{}...", stage.label()));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    fn streaming_bar(&self, total: u64) -> ProgressBar {
        let bar = ProgressBar::with_draw_target(Some(total), self.target());
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar
    }

    fn on_progress(&self, current: u64, total: u64) {
        let Ok(mut slot) = self.current.lock() else {
            return;
        };
        let bar = slot.get_or_insert_with(|| self.streaming_bar(total));
        if bar.length() != Some(total) {
            bar.set_length(total);
        }
        bar.set_position(current);

        if let Ok(started) = self.started.lock() {
            if let Some(start) = *started {
                let elapsed = start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    bar.set_message(format!("({:.0} docs/sec)", current as f64 / elapsed));
                }
            }
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: ExportEvent) {
        match event {
            ExportEvent::StageStarted(stage) => {
                let Ok(mut slot) = self.current.lock() else {
                    return;
                };
                if stage == ExportState::Streaming {
                    // The bar is created on the first progress event
                    *slot = None;
                    if let Ok(mut started) = self.started.lock() {
                        *started = Some(Instant::now());
                    }
                } else {
                    *slot = Some(self.spinner(stage));
                }
            }
            ExportEvent::StageSucceeded { stage, summary } => {
                if let Ok(mut slot) = self.current.lock() {
                    let bar = slot.take().unwrap_or_else(|| self.spinner(stage));
                    bar.finish_with_message(format!("✓ {}: {}", stage.label(), summary));
                }
            }
            ExportEvent::StageFailed { stage, error } => {
                if let Ok(mut slot) = self.current.lock() {
                    let bar = slot.take().unwrap_or_else(|| self.spinner(stage));
                    bar.abandon_with_message(format!("✗ {}: {}", stage.label(), error));
                }
            }
            ExportEvent::Progress { current, total } => self.on_progress(current, total),
        }
    }
}
