//! The sampling loop.
//!
//! One strictly sequential loop per run: fetch, extract, account, report,
//! sleep, then check the window. A failed scrape ends the run immediately;
//! retrying is left to whoever launched it.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

use tally_scrape::{FetchError, FetchResult, Fetcher, Snapshot};

use crate::extract::{extract, LabelFilter};
use crate::session::{Observation, ResetPolicy, Session};

/// Time between two samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Anything that can produce a metrics snapshot on demand.
pub trait SnapshotSource {
    fn fetch(&self) -> impl Future<Output = FetchResult<Snapshot>>;
}

impl SnapshotSource for Fetcher {
    fn fetch(&self) -> impl Future<Output = FetchResult<Snapshot>> {
        Fetcher::fetch(self)
    }
}

/// Receives one observation per accounted interval.
pub trait Reporter {
    fn observed(&mut self, observation: &Observation);
}

impl<F: FnMut(&Observation)> Reporter for F {
    fn observed(&mut self, observation: &Observation) {
        self(observation)
    }
}

/// How the loop waits between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Sleep a full interval after each scrape; slow scrapes stretch the
    /// interval.
    #[default]
    Fixed,
    /// Subtract the scrape latency from the sleep so each iteration takes
    /// about one interval.
    Compensated,
}

/// Why a run ended.
#[derive(Debug)]
pub enum Stop {
    WindowElapsed,
    /// The shutdown signal fired during a scrape or a sleep.
    Interrupted,
    FetchFailed(FetchError),
}

/// The outcome of a run.
#[derive(Debug)]
pub struct Summary {
    /// Accumulated counter increase over the run.
    pub total: f64,
    /// Successful scrapes.
    pub samples: u64,
    /// Intervals reported, one fewer than `samples` on a full run.
    pub observations: u64,
    /// Intervals where the counter went down.
    pub resets: u64,
    /// Wall time from start to stop.
    pub elapsed: Duration,
    pub stop: Stop,
}

/// Drives a [`SnapshotSource`] at a fixed cadence for one window.
pub struct Sampler<S> {
    source: S,
    /// Which `action` samples count.
    filter: LabelFilter,
    policy: ResetPolicy,
    pacing: Pacing,
    /// Sleep between scrapes, before pacing adjusts it.
    interval: Duration,
    /// Run length, checked after every sleep.
    window: Duration,
}

impl<S: SnapshotSource> Sampler<S> {
    pub fn new(source: S, window: Duration) -> Self {
        Self {
            source,
            filter: LabelFilter::default(),
            policy: ResetPolicy::default(),
            pacing: Pacing::default(),
            interval: SAMPLE_INTERVAL,
            window,
        }
    }

    pub fn with_filter(mut self, filter: LabelFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_policy(mut self, policy: ResetPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Sample until the window elapses, a scrape fails, or `shutdown`
    /// fires.
    pub async fn run<R: Reporter>(
        &self,
        reporter: &mut R,
        mut shutdown: watch::Receiver<bool>,
    ) -> Summary {
        let mut session = Session::new(self.policy, self.interval, self.window);

        info!(
            window_secs = self.window.as_secs(),
            interval_ms = self.interval.as_millis() as u64,
            include = ?self.filter.include(),
            exclude = %self.filter.exclude(),
            "sampling started"
        );

        let stop = loop {
            if *shutdown.borrow_and_update() {
                break Stop::Interrupted;
            }

            let tick = Instant::now();
            let fetched = tokio::select! {
                result = self.source.fetch() => result,
                Ok(()) = shutdown.changed() => break Stop::Interrupted,
            };

            let snapshot = match fetched {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!(error = %e, "scrape failed, stopping");
                    break Stop::FetchFailed(e);
                }
            };

            let count = extract(&snapshot, &self.filter);
            debug!(count, sample = session.samples() + 1, "sampled action counter");

            if let Some(observation) = session.observe(count) {
                reporter.observed(&observation);
            }

            let pause = match self.pacing {
                Pacing::Fixed => self.interval,
                Pacing::Compensated => self.interval.saturating_sub(tick.elapsed()),
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                Ok(()) = shutdown.changed() => break Stop::Interrupted,
            }

            if session.window_elapsed() {
                break Stop::WindowElapsed;
            }
        };

        let summary = Summary {
            total: session.total_delta(),
            samples: session.samples(),
            observations: session.observations(),
            resets: session.resets(),
            elapsed: session.elapsed(),
            stop,
        };

        info!(
            total = summary.total,
            samples = summary.samples,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            stop = ?summary.stop,
            "sampling finished"
        );

        summary
    }
}
