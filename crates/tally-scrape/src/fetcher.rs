//! One-shot HTTP scrapes of a metrics endpoint.
//!
//! Each scrape performs a GET over HTTP/1.1, plain or TLS, follows a bounded
//! number of redirects, and parses the body. The whole exchange is bounded
//! by the fetcher's timeout.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, LOCATION, USER_AGENT};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::exposition::{parse_exposition, Snapshot};

/// Default bound on a single scrape.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirects followed before a scrape gives up.
pub const MAX_REDIRECTS: usize = 10;

type HttpClient = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// Scrapes a single `http://` or `https://` metrics endpoint.
#[derive(Debug, Clone)]
pub struct Fetcher {
    uri: Uri,
    client: HttpClient,
    timeout: Duration,
}

impl Fetcher {
    /// Validate `url` and build a fetcher for it.
    pub fn new(url: &str, timeout: Duration) -> FetchResult<Self> {
        let uri = parse_url(url)?;
        Ok(Self {
            uri,
            client: build_client()?,
            timeout,
        })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Scrape the endpoint once and parse the result.
    pub async fn fetch(&self) -> FetchResult<Snapshot> {
        let body = match tokio::time::timeout(self.timeout, self.fetch_body()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                debug!(error = %e, uri = %self.uri, "scrape failed");
                return Err(e);
            }
            Err(_) => {
                debug!(uri = %self.uri, timeout = ?self.timeout, "scrape timed out");
                return Err(FetchError::Timeout(self.timeout));
            }
        };

        let snapshot = parse_exposition(&body).map_err(|e| {
            debug!(error = %e, uri = %self.uri, "scrape returned malformed exposition");
            FetchError::from(e)
        })?;
        debug!(
            uri = %self.uri,
            families = snapshot.families().len(),
            "scrape complete"
        );
        Ok(snapshot)
    }

    async fn fetch_body(&self) -> FetchResult<String> {
        let mut uri = self.uri.clone();
        let mut redirects = 0;

        let resp = loop {
            let resp = self.get(&uri).await?;
            let status = resp.status();
            if !status.is_redirection() {
                break resp;
            }

            let Some(location) = resp.headers().get(LOCATION) else {
                return Err(FetchError::Status(status));
            };
            if redirects == MAX_REDIRECTS {
                return Err(FetchError::TooManyRedirects(MAX_REDIRECTS));
            }
            let location = location.to_str().map_err(|e| FetchError::Redirect {
                location: String::from_utf8_lossy(location.as_bytes()).into_owned(),
                reason: e.to_string(),
            })?;
            let next = resolve_location(&uri, location)?;
            debug!(from = %uri, to = %next, status = %status, "following redirect");
            uri = next;
            redirects += 1;
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(FetchError::Body)?
            .to_bytes();
        Ok(String::from_utf8(body.to_vec())?)
    }

    async fn get(&self, uri: &Uri) -> FetchResult<http::Response<Incoming>> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(uri.clone())
            .header(ACCEPT, "text/plain")
            .header(USER_AGENT, concat!("tally/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())?;

        self.client.request(req).await.map_err(|e| {
            if e.is_connect() {
                FetchError::Connect {
                    uri: uri.to_string(),
                    source: e,
                }
            } else {
                FetchError::Request(e)
            }
        })
    }
}

fn parse_url(url: &str) -> FetchResult<Uri> {
    let invalid = |reason: &str| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(_) => return Err(FetchError::UnsupportedScheme(url.to_string())),
        None => return Err(invalid("missing scheme")),
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(uri)
}

fn build_client() -> FetchResult<HttpClient> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let tls = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();

    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .build();
    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// Resolve a `Location` header against the URI that returned it.
fn resolve_location(base: &Uri, location: &str) -> FetchResult<Uri> {
    let invalid = |reason: String| FetchError::Redirect {
        location: location.to_string(),
        reason,
    };

    let target: Uri = location.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
    if target.scheme().is_some() {
        return match target.scheme_str() {
            Some("http" | "https") if target.authority().is_some() => Ok(target),
            _ => Err(invalid("unsupported target".to_string())),
        };
    }

    let path_and_query = if location.starts_with('/') {
        location.to_string()
    } else {
        // Relative reference: replace the last path segment.
        let dir = base.path().rsplit_once('/').map_or("", |(dir, _)| dir);
        format!("{dir}/{location}")
    };

    let mut parts = base.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?,
    );
    Uri::from_parts(parts).map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: text/plain; version=0.0.4\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Serve one canned response and return the URL to scrape.
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/metrics")
    }

    /// Serve canned responses, one per connection, in order.
    async fn serve_sequence(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/metrics")
    }

    fn redirect_response(location: &str) -> String {
        format!(
            "HTTP/1.1 302 Found\r\nlocation: {location}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
        )
    }

    #[test]
    fn new_accepts_http_url_with_port() {
        let fetcher = Fetcher::new("http://localhost:63626/metrics", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(fetcher.uri().host(), Some("localhost"));
        assert_eq!(fetcher.uri().port_u16(), Some(63626));
        assert_eq!(fetcher.uri().path(), "/metrics");
        assert_eq!(fetcher.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn new_accepts_https() {
        let fetcher = Fetcher::new("https://temporal.example.com/metrics", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(fetcher.uri().scheme_str(), Some("https"));
    }

    #[test]
    fn new_rejects_other_schemes() {
        let err = Fetcher::new("ftp://localhost/metrics", DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme(_)));
    }

    #[test]
    fn new_rejects_missing_scheme() {
        let err = Fetcher::new("/metrics", DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[test]
    fn new_rejects_garbage() {
        let err = Fetcher::new("http://exa mple/", DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn fetch_parses_successful_scrape() {
        let body = "# TYPE action counter\naction{namespace=\"default\"} 42\n";
        let url = serve_once(http_response("200 OK", body)).await;

        let fetcher = Fetcher::new(&url, Duration::from_secs(2)).unwrap();
        let snapshot = fetcher.fetch().await.unwrap();

        let action: Vec<_> = snapshot.family("action").collect();
        assert_eq!(action.len(), 1);
        assert_eq!(action[0].samples[0].value, 42.0);
    }

    #[tokio::test]
    async fn fetch_non_2xx_is_status_error() {
        let url = serve_once(http_response("503 Service Unavailable", "down")).await;

        let fetcher = Fetcher::new(&url, Duration::from_secs(2)).unwrap();
        let err = fetcher.fetch().await.unwrap_err();
        match err {
            FetchError::Status(status) => assert_eq!(status, http::StatusCode::SERVICE_UNAVAILABLE),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_malformed_body_is_parse_error() {
        let url = serve_once(http_response("200 OK", "action{namespace=\"x\" 1\n")).await;

        let fetcher = Fetcher::new(&url, Duration::from_secs(2)).unwrap();
        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn fetch_closed_port_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = Fetcher::new(&format!("http://{addr}/metrics"), Duration::from_secs(2)).unwrap();
        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Connect { .. }));
    }

    #[tokio::test]
    async fn fetch_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let fetcher = Fetcher::new(&format!("http://{addr}/metrics"), Duration::from_millis(100)).unwrap();
        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn fetch_follows_redirect() {
        let body = "# TYPE action counter\naction{namespace=\"default\"} 7\n";
        let url = serve_sequence(vec![
            redirect_response("/metrics/v2"),
            http_response("200 OK", body),
        ])
        .await;

        let fetcher = Fetcher::new(&url, Duration::from_secs(2)).unwrap();
        let snapshot = fetcher.fetch().await.unwrap();
        let action: Vec<_> = snapshot.family("action").collect();
        assert_eq!(action[0].samples[0].value, 7.0);
    }

    #[tokio::test]
    async fn fetch_redirect_loop_gives_up() {
        let responses = (0..=MAX_REDIRECTS).map(|_| redirect_response("/metrics")).collect();
        let url = serve_sequence(responses).await;

        let fetcher = Fetcher::new(&url, Duration::from_secs(2)).unwrap();
        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects(MAX_REDIRECTS)));
    }

    #[tokio::test]
    async fn fetch_redirect_without_location_is_status_error() {
        let url = serve_once(
            "HTTP/1.1 302 Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n".to_string(),
        )
        .await;

        let fetcher = Fetcher::new(&url, Duration::from_secs(2)).unwrap();
        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(s) if s == http::StatusCode::FOUND));
    }

    #[test]
    fn resolve_location_forms() {
        let base: Uri = "http://host:9090/a/metrics?x=1".parse().unwrap();

        let absolute = resolve_location(&base, "https://other/metrics").unwrap();
        assert_eq!(absolute.to_string(), "https://other/metrics");

        let rooted = resolve_location(&base, "/b/metrics").unwrap();
        assert_eq!(rooted.to_string(), "http://host:9090/b/metrics");

        let relative = resolve_location(&base, "v2?y=2").unwrap();
        assert_eq!(relative.to_string(), "http://host:9090/a/v2?y=2");

        let err = resolve_location(&base, "ftp://other/metrics").unwrap_err();
        assert!(matches!(err, FetchError::Redirect { .. }));
    }
}
