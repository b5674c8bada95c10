use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::Instrument;

use ovpn_usage::config::Config;
use ovpn_usage::display::DisplayStyle;
use ovpn_usage::logging;
use ovpn_usage::monitor::{MonitorOptions, PersistOptions, UsageMonitor};

#[derive(Parser)]
#[command(name = "ovpn-usage")]
#[command(about = "Live per-client OpenVPN traffic monitor with optional persistent totals")]
#[command(version)]
struct Cli {
    /// Path to the OpenVPN status file
    status_file: Option<PathBuf>,

    /// Refresh interval in seconds
    interval: Option<f64>,

    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,

    /// Use ASCII status symbols instead of ●/○ (implies --no-color)
    #[arg(long)]
    ascii: bool,

    /// Enable persistence, optionally at PATH (default: configured state path)
    #[arg(long, value_name = "PATH")]
    persist: Option<Option<PathBuf>>,

    /// How often to save state, in seconds
    #[arg(long, value_name = "SECS")]
    persist_interval: Option<u64>,

    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Print the single cycle as JSON (requires --once)
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Flags win over file and environment
    fn apply(&self, config: &mut Config) {
        if let Some(status_file) = &self.status_file {
            config.monitor.status_file = status_file.clone();
        }
        if let Some(interval) = self.interval {
            config.monitor.interval_secs = interval;
        }
        if let Some(persist_interval) = self.persist_interval {
            config.monitor.persist_interval_secs = persist_interval;
        }
        if let Some(Some(path)) = &self.persist {
            config.monitor.state_path = path.clone();
        }
        if self.no_color {
            config.display.color = false;
        }
        if self.ascii {
            config.display.ascii = true;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json && !cli.once {
        eprintln!("Error: --json is only supported together with --once");
        process::exit(2);
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    if config.logging.output != "console" {
        std::fs::create_dir_all(&config.paths.log_directory).with_context(|| {
            format!(
                "Failed to create log directory: {}",
                config.paths.log_directory.display()
            )
        })?;
    }
    let _log_guard = logging::init_logging(&config.logging, &config.paths.log_directory);

    let monitor = UsageMonitor::new(MonitorOptions {
        status_file: config.monitor.status_file.clone(),
        interval: config.poll_interval()?,
        persist: cli.persist.as_ref().map(|_| PersistOptions {
            path: config.monitor.state_path.clone(),
            interval: Duration::from_secs(config.monitor.persist_interval_secs),
        }),
        style: DisplayStyle::new(config.display.color, config.display.ascii),
    });

    let span = logging::run_span();
    if cli.once {
        let _entered = span.enter();
        monitor.run_once(cli.json)
    } else {
        monitor.run().instrument(span).await
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}
