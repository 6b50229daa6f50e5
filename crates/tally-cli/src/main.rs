//! tally — counts billable actions on a Temporal server.
//!
//! Scrapes the server's Prometheus endpoint once a second, reports the
//! per-second rate of the `action` counter, and prints the total over the
//! requested window.
//!
//! # Usage
//!
//! ```text
//! tally --time-window-seconds 120 --included-namespace default
//! ```

use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally_accountant::Sampler;
use tally_scrape::Fetcher;

mod config;
mod console;

use config::{MonitorConfig, ResetMode, Settings};
use console::Console;

/// Start/stop lines from the binary and the sampler; warnings from everything else.
const DEFAULT_LOG_FILTER: &str = "warn,tally=info,tally_accountant=info";

const EXAMPLES: &str = "\
Examples:
  tally --time-window-seconds 120
  tally --time-window-seconds 120 --prometheus-url http://localhost:9090/metrics --included-namespace default";

#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version,
    about = "Monitor Prometheus action metrics and report actions per second and the total over a time window.",
    long_about = "Monitors the `action` counter exposed by a Temporal server's Prometheus \
endpoint, prints the average actions per second every second, and reports the \
total number of actions once the time window has elapsed. Actions in the \
excluded namespace (temporal_system by default) are never counted.",
    after_long_help = EXAMPLES,
)]
struct Cli {
    /// The time period in seconds over which actions are totalled.
    #[arg(long, value_name = "SECONDS")]
    time_window_seconds: Option<u64>,

    /// The Prometheus scrape URL [default: http://localhost:63626/metrics].
    #[arg(long, value_name = "URL")]
    prometheus_url: Option<String>,

    /// Only count actions in this namespace (default: all namespaces).
    #[arg(long, value_name = "NAMESPACE")]
    included_namespace: Option<String>,

    /// Never count actions in this namespace [default: temporal_system].
    #[arg(long, value_name = "NAMESPACE")]
    excluded_namespace: Option<String>,

    /// How to account a counter that goes down (upstream restart) [default: rebase].
    #[arg(long, value_enum)]
    on_reset: Option<ResetMode>,

    /// Shorten each sleep by the scrape latency to hold a 1s cadence.
    #[arg(long)]
    compensate_drift: bool,

    /// Timeout for a single scrape [default: 10].
    #[arg(long, value_name = "SECONDS")]
    timeout_seconds: Option<u64>,

    /// TOML file with the same settings; flags take precedence.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Settings {
        Settings {
            time_window_seconds: self.time_window_seconds,
            prometheus_url: self.prometheus_url.clone(),
            included_namespace: self.included_namespace.clone(),
            excluded_namespace: self.excluded_namespace.clone(),
            on_reset: self.on_reset,
            compensate_drift: self.compensate_drift.then_some(true),
            timeout_seconds: self.timeout_seconds,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };

    let Some(config) = base.merge(cli.overrides()).resolve() else {
        Cli::command().print_long_help()?;
        println!();
        return Ok(());
    };

    run(config).await;
    Ok(())
}

async fn run(config: MonitorConfig) {
    let mut console = Console::stdout();
    console.banner(&config);

    let fetcher = match Fetcher::new(&config.prometheus_url, config.timeout) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            console.error(&e);
            console.total(config.window_secs, 0.0);
            return;
        }
    };

    // Ctrl-C ends the run early but still reports the total.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing up");
            let _ = shutdown_tx.send(true);
        }
    });

    let sampler = Sampler::new(fetcher, config.window())
        .with_filter(config.filter.clone())
        .with_policy(config.reset_policy)
        .with_pacing(config.pacing);

    let summary = sampler.run(&mut console, shutdown_rx).await;
    console.summary(config.window_secs, &summary);
}
