//! Live Monitoring Loop
//!
//! Drives the read → fold → render → persist cycle on a fixed interval until
//! interrupted.
//!
//! ## Cycle
//!
//! 1. Read the status file in full and extract a [`Snapshot`]
//! 2. Fold it into the record set
//! 3. Clear the screen and draw the table
//! 4. Save the records if the persistence interval has elapsed
//!
//! The record set is a plain value owned by [`UsageMonitor::run`] and threaded
//! through each cycle. Nothing else mutates it.
//!
//! ## Failure policy
//!
//! Nothing in steady state is fatal. An unreadable status file is an empty
//! snapshot, a failed save is retried on the next cycle, and both are logged.
//! On Ctrl+C (or SIGTERM on unix) one last save is attempted before exit.
//!
//! ## Usage
//!
//! ```no_run
//! use ovpn_usage::display::DisplayStyle;
//! use ovpn_usage::monitor::{MonitorOptions, UsageMonitor};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let monitor = UsageMonitor::new(MonitorOptions {
//!     status_file: "/etc/openvpn/server/logs/vpn-udp-status.log".into(),
//!     interval: Duration::from_secs(1),
//!     persist: None,
//!     style: DisplayStyle::default(),
//! });
//!
//! // Blocks until Ctrl+C
//! monitor.run().await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::display::{client_rows, DisplayStyle, TableRenderer};
use crate::engine::fold_with_report;
use crate::extractor::{read_status, SnapshotExtractor};
use crate::models::{RecordSet, Snapshot};
use crate::store;

/// Where and how often to persist.
#[derive(Debug, Clone)]
pub struct PersistOptions {
    pub path: PathBuf,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub status_file: PathBuf,
    pub interval: Duration,
    pub persist: Option<PersistOptions>,
    pub style: DisplayStyle,
}

/// Gate for periodic saves. Only a successful save restarts the interval.
#[derive(Debug, Clone)]
pub struct PersistSchedule {
    interval: Duration,
    last_save: Option<Instant>,
}

impl PersistSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_save: None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_save {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn mark_saved(&mut self, now: Instant) {
        self.last_save = Some(now);
    }
}

pub struct UsageMonitor {
    options: MonitorOptions,
    extractor: SnapshotExtractor,
    renderer: TableRenderer,
}

impl UsageMonitor {
    pub fn new(options: MonitorOptions) -> Self {
        let renderer = TableRenderer::new(options.style);
        Self {
            options,
            extractor: SnapshotExtractor::new(),
            renderer,
        }
    }

    /// Persisted records when persistence is enabled, otherwise nothing
    pub fn initial_records(&self) -> RecordSet {
        match &self.options.persist {
            Some(persist) => store::load(&persist.path),
            None => RecordSet::new(),
        }
    }

    /// Read the status file; any failure degrades to an empty snapshot
    pub fn read_snapshot(&self) -> Snapshot {
        let taken_at = Utc::now();
        match read_status(&self.options.status_file) {
            Ok(Some(text)) => self.extractor.extract(&text, taken_at),
            Ok(None) => {
                debug!(
                    path = %self.options.status_file.display(),
                    "Status file not present, treating as empty"
                );
                Snapshot::new(taken_at)
            }
            Err(e) => {
                warn!(error = %e, "Failed to read status file, treating as empty");
                Snapshot::new(taken_at)
            }
        }
    }

    /// One read and fold
    pub fn cycle(&self, records: RecordSet) -> (RecordSet, Snapshot) {
        let snapshot = self.read_snapshot();
        let (records, report) = fold_with_report(records, &snapshot);

        if report.new_identities > 0 || report.session_resets > 0 {
            info!(
                new_identities = report.new_identities,
                session_resets = report.session_resets,
                "Client sessions changed"
            );
        }
        debug!(
            online = snapshot.len(),
            known = records.len(),
            continuing = report.continuing,
            carried_forward = report.carried_forward,
            credited_received = report.credited_received,
            credited_sent = report.credited_sent,
            "Cycle folded"
        );

        (records, snapshot)
    }

    /// Save if persistence is enabled. Returns whether a save happened.
    pub fn persist(&self, records: &RecordSet) -> bool {
        let Some(persist) = &self.options.persist else {
            return false;
        };

        match store::save(&persist.path, records) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save state, will retry");
                false
            }
        }
    }

    /// Single cycle: load, read, fold, print, save. For scripting.
    pub fn run_once(&self, json_output: bool) -> Result<()> {
        let (records, snapshot) = self.cycle(self.initial_records());

        if json_output {
            let output = serde_json::json!({
                "taken_at": snapshot.taken_at,
                "clients": client_rows(&records, &snapshot),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("Failed to serialize clients")?
            );
        } else {
            print!("{}", self.renderer.render(&records, &snapshot));
            io::stdout().flush().context("Failed to write to stdout")?;
        }

        self.persist(&records);
        Ok(())
    }

    /// Redraw every interval until interrupted
    pub async fn run(&self) -> Result<()> {
        info!(
            status_file = %self.options.status_file.display(),
            interval_ms = self.options.interval.as_millis() as u64,
            persist = self.options.persist.is_some(),
            "Starting live monitor"
        );

        let mut records = self.initial_records();
        let mut schedule = self
            .options
            .persist
            .as_ref()
            .map(|persist| PersistSchedule::new(persist.interval));

        let mut interval = time::interval(self.options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        let mut stdout = io::stdout();
        self.hide_cursor(&mut stdout);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    let (next, snapshot) = self.cycle(records);
                    records = next;

                    if let Err(e) = self.draw(&mut stdout, &records, &snapshot) {
                        warn!(error = %e, "Failed to draw table");
                    }

                    if let Some(schedule) = schedule.as_mut() {
                        let now = Instant::now();
                        if schedule.is_due(now) && self.persist(&records) {
                            schedule.mark_saved(now);
                        }
                    }
                }
            }
        }

        self.show_cursor(&mut stdout);

        if self.persist(&records) {
            info!(clients = records.len(), "Final state saved");
        }

        Ok(())
    }

    fn draw(&self, stdout: &mut io::Stdout, records: &RecordSet, snapshot: &Snapshot) -> Result<()> {
        let table = self.renderer.render(records, snapshot);
        execute!(stdout, MoveTo(0, 0), Clear(ClearType::All)).context("Failed to clear screen")?;
        stdout.write_all(table.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    fn hide_cursor(&self, stdout: &mut io::Stdout) {
        let _ = execute!(stdout, Hide);
    }

    fn show_cursor(&self, stdout: &mut io::Stdout) {
        let _ = execute!(stdout, Show);
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
