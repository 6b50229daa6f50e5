//! Delta accounting across consecutive samples.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// What to do when the counter goes down between two samples.
///
/// A decrease normally means the upstream process restarted and its
/// counter started again from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Count the new value as the increase since the restart.
    ///
    /// The check runs on the filtered sum, not per series. A restart of one
    /// series goes unnoticed unless it lowers the sum, and when it does the
    /// whole new sum is credited to that interval.
    #[default]
    Rebase,
    /// Contribute nothing for that interval; the new value is the baseline.
    Ignore,
    /// Keep the negative delta and subtract it from the total.
    Subtract,
}

impl ResetPolicy {
    fn delta(self, previous: f64, current: f64) -> f64 {
        match self {
            Self::Rebase => current,
            Self::Ignore => 0.0,
            Self::Subtract => current - previous,
        }
    }
}

/// The accounting result of one interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Counter increase over the interval.
    pub delta: f64,
    /// Increase per second.
    pub rate: f64,
    /// Whether the counter went down during the interval.
    pub reset: bool,
}

/// State owned by one sampling run.
#[derive(Debug, Clone)]
pub struct Session {
    /// Applied when the count goes down.
    policy: ResetPolicy,
    /// Nominal time between samples; divides deltas into rates.
    interval: Duration,
    /// How long the session runs.
    window: Duration,
    started_at: Instant,
    /// Last count seen; `None` until the first sample.
    previous_count: Option<f64>,
    /// Sum of all deltas so far.
    total_delta: f64,
    /// Counts passed to `observe`, baseline included.
    samples: u64,
    /// Intervals accounted, i.e. samples after the first.
    observations: u64,
    /// Intervals where the count went down.
    resets: u64,
}

impl Session {
    /// Start a session; the window is measured from now.
    pub fn new(policy: ResetPolicy, interval: Duration, window: Duration) -> Self {
        Self {
            policy,
            interval,
            window,
            started_at: Instant::now(),
            previous_count: None,
            total_delta: 0.0,
            samples: 0,
            observations: 0,
            resets: 0,
        }
    }

    /// Account a new cumulative count.
    ///
    /// The first sample only sets the baseline and yields nothing.
    pub fn observe(&mut self, count: f64) -> Option<Observation> {
        self.samples += 1;
        let previous = self.previous_count.replace(count)?;

        let reset = count < previous;
        let delta = if reset {
            self.resets += 1;
            warn!(
                previous,
                current = count,
                policy = ?self.policy,
                "counter went backwards, assuming upstream restart"
            );
            self.policy.delta(previous, count)
        } else {
            count - previous
        };

        self.total_delta += delta;
        self.observations += 1;
        debug!(delta, total = self.total_delta, "interval accounted");

        Some(Observation {
            delta,
            rate: delta / self.interval.as_secs_f64(),
            reset,
        })
    }

    pub fn total_delta(&self) -> f64 {
        self.total_delta
    }

    pub fn previous_count(&self) -> Option<f64> {
        self.previous_count
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether the configured window has been reached.
    pub fn window_elapsed(&self) -> bool {
        self.elapsed() >= self.window
    }
}
