//! tally-accountant — turns cumulative counter scrapes into rates.
//!
//! Samples a metrics endpoint at a fixed cadence, extracts the value of
//! the `action` counter for the selected namespaces, and accounts the
//! increase between consecutive samples over a bounded window.
//!
//! # Architecture
//!
//! ```text
//! Sampler::run()
//!   ├── SnapshotSource::fetch() → Snapshot | FetchError (fail-fast)
//!   ├── extract(snapshot, LabelFilter) → cumulative count
//!   ├── Session::observe(count) → Option<Observation>
//!   │     └── ResetPolicy decides what a decreasing counter means
//!   ├── Reporter::observed() ← once per interval after the first sample
//!   └── sleep (Pacing) → window check → Summary
//! ```
//!
//! The loop stops when the window has elapsed, when a scrape fails, or
//! when the shutdown channel fires. All three return a [`Summary`] with
//! the total accumulated so far.

pub mod extract;
pub mod sampler;
pub mod session;

pub use extract::{extract, LabelFilter, ACTION_FAMILY, DEFAULT_EXCLUDED_NAMESPACE, NAMESPACE_LABEL};
pub use sampler::{Pacing, Reporter, Sampler, SnapshotSource, Stop, Summary, SAMPLE_INTERVAL};
pub use session::{Observation, ResetPolicy, Session};
