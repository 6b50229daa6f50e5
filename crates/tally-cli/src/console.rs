//! Human-readable report lines on stdout.

use std::io::{self, Write};

use tracing::warn;

use tally_accountant::{Observation, Reporter, Stop, Summary};
use tally_scrape::FetchError;

use crate::config::MonitorConfig;

/// Writes the startup banner, per-interval rates, and the final total.
pub struct Console<W> {
    out: W,
}

impl Console<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn banner(&mut self, config: &MonitorConfig) {
        let window = config.window_secs;
        self.line(format_args!(
            "Starting Prometheus action metric monitoring with a time window of {window} seconds..."
        ));
        self.line(format_args!(
            "Monitoring Prometheus endpoint: {}",
            config.prometheus_url
        ));
        match config.filter.include() {
            Some(ns) => self.line(format_args!("Sampling only from namespace: {ns}")),
            None => self.line(format_args!("Sampling from all namespaces.")),
        }
        self.line(format_args!(
            "Please wait, the total number of actions will be reported after {window} seconds..."
        ));
    }

    pub fn error(&mut self, err: &FetchError) {
        self.line(format_args!("An error occurred: {err}"));
    }

    /// Final lines; printed however the run ended.
    pub fn summary(&mut self, window_secs: u64, summary: &Summary) {
        if let Stop::FetchFailed(e) = &summary.stop {
            self.error(e);
        }
        self.total(window_secs, summary.total);
    }

    /// The total keeps its float form, e.g. `20.0`.
    pub fn total(&mut self, window_secs: u64, total: f64) {
        self.line(format_args!(
            "Total actions in the last {window_secs} seconds: {total:?}"
        ));
        self.line(format_args!("Monitoring completed."));
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{args}").and_then(|()| self.out.flush()) {
            warn!(error = %e, "failed to write report line");
        }
    }
}

impl<W: Write> Reporter for Console<W> {
    fn observed(&mut self, observation: &Observation) {
        self.line(format_args!(
            "Current average actions per second: {:.2}",
            observation.rate
        ));
    }
}
