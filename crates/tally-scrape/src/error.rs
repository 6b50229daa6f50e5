//! Scrape error types.

use std::time::Duration;

use thiserror::Error;

/// Why a line of exposition text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("missing metric name")]
    MissingName,

    #[error("missing sample value")]
    MissingValue,

    #[error("invalid sample value {0:?}")]
    InvalidValue(String),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("unexpected trailing input {0:?}")]
    TrailingInput(String),

    #[error("unterminated label set")]
    UnterminatedLabels,

    #[error("malformed label pair")]
    MalformedLabel,

    #[error("invalid metric type {0:?}")]
    InvalidType(String),
}

/// A parse failure, located by its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

/// Errors that can occur while scraping a metrics endpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid metrics url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported scheme in {0} (only http and https are supported)")]
    UnsupportedScheme(String),

    #[error("tls setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("connection to {uri} failed: {source}")]
    Connect {
        uri: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("invalid request: {0}")]
    Build(#[from] http::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper_util::client::legacy::Error),

    #[error("invalid redirect to {location:?}: {reason}")]
    Redirect { location: String, reason: String },

    #[error("gave up after {0} redirects")]
    TooManyRedirects(usize),

    #[error("endpoint returned {0}")]
    Status(http::StatusCode),

    #[error("failed to read response body: {0}")]
    Body(#[source] hyper::Error),

    #[error("response body is not utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("malformed exposition: {0}")]
    Parse(#[from] ParseError),

    #[error("scrape timed out after {0:?}")]
    Timeout(Duration),
}

pub type FetchResult<T> = Result<T, FetchError>;
