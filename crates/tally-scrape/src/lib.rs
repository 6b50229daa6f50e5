//! tally-scrape — fetches and parses Prometheus metrics snapshots.
//!
//! A scrape is a single HTTP GET against a metrics endpoint whose body is
//! decoded from the Prometheus text exposition format into a [`Snapshot`].
//!
//! # Architecture
//!
//! ```text
//! Fetcher
//!   ├── fetch() → one bounded HTTP/1.1 GET (hyper over tokio TCP)
//!   └── parse_exposition() → Snapshot
//!         └── MetricFamily (name, type, help)
//!               └── Sample (labels, value, timestamp)
//! ```
//!
//! Every failure along the way (connect, status, body, parse, timeout) is
//! returned as a [`FetchError`]. Nothing is retried here; retry policy is
//! left to the caller.

pub mod error;
pub mod exposition;
pub mod fetcher;

pub use error::{FetchError, FetchResult, ParseError, ParseErrorKind};
pub use exposition::{parse_exposition, MetricFamily, MetricType, Sample, Snapshot};
pub use fetcher::{Fetcher, DEFAULT_TIMEOUT, MAX_REDIRECTS};
