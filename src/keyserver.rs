use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, Response, StatusCode, Url};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{Fingerprint, KeyBlob};

/// Default keyserver pool, queried in this order.
pub const DEFAULT_KEYSERVERS: &[&str] = &[
    "hkps://keys.openpgp.org",
    "hkps://keyserver.ubuntu.com",
    "hkps://pgp.mit.edu",
    "hkps://keys.mailvelope.com",
];

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const HKP_DEFAULT_PORT: u16 = 11371;

/// Largest key response accepted from a single endpoint.
pub const DEFAULT_BODY_LIMIT: usize = 8 * 1024 * 1024;

/// Why a single endpoint produced no key.
///
/// These never leave [`KeyserverPool::lookup`]; they are logged and treated
/// as "absent".
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EndpointError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("no such key")]
    NotFound,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("empty response")]
    Empty,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A source of armored public keys, looked up by fingerprint.
#[async_trait]
pub trait Keyserver: Send + Sync {
    /// Human-readable endpoint identifier, used in logs and reports.
    fn endpoint(&self) -> &str;

    async fn fetch(&self, fingerprint: &Fingerprint) -> std::result::Result<String, EndpointError>;
}

/// An HKP (HTTP Keyserver Protocol) endpoint.
#[derive(Debug, Clone)]
pub struct HkpKeyserver {
    endpoint: String,
    base: Url,
    client: Client,
    body_limit: usize,
}

impl HkpKeyserver {
    /// Creates a client for `endpoint`.
    ///
    /// `hkp://` is mapped to plain HTTP on port 11371 unless a port is
    /// given, `hkps://` to HTTPS; `http://` and `https://` are used as is.
    pub fn new(endpoint: &str, client: Client) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.to_string(),
            base: base_url(endpoint)?,
            client,
            body_limit: DEFAULT_BODY_LIMIT,
        })
    }

    /// Caps the response body at `limit` bytes.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// The lookup URL for `fingerprint`, below any path of the endpoint.
    pub fn lookup_url(&self, fingerprint: &Fingerprint) -> Url {
        let mut url = self.base.clone();
        let path = format!("{}/pks/lookup", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_fragment(None);
        url.query_pairs_mut()
            .clear()
            .append_pair("op", "get")
            .append_pair("options", "mr")
            .append_pair("search", &fingerprint.query());
        url
    }
}

#[async_trait]
impl Keyserver for HkpKeyserver {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self, fingerprint: &Fingerprint) -> std::result::Result<String, EndpointError> {
        let url = self.lookup_url(fingerprint);
        debug!(%url, "querying keyserver");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EndpointError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(EndpointError::NotFound),
            status if !status.is_success() => return Err(EndpointError::Status(status.as_u16())),
            _ => {}
        }

        let body = read_body(response, self.body_limit).await?;
        if body.trim().is_empty() {
            return Err(EndpointError::Empty);
        }
        Ok(body)
    }
}

async fn read_body(mut response: Response, limit: usize) -> std::result::Result<String, EndpointError> {
    let too_large = || EndpointError::Request(format!("response larger than {limit} bytes"));

    if response.content_length().is_some_and(|len| len > limit as u64) {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| EndpointError::Request(e.to_string()))?
    {
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn base_url(endpoint: &str) -> Result<Url> {
    let invalid = |reason: String| Error::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let (rewritten, default_port) = if let Some(rest) = endpoint.strip_prefix("hkps://") {
        (format!("https://{rest}"), None)
    } else if let Some(rest) = endpoint.strip_prefix("hkp://") {
        (format!("http://{rest}"), Some(HKP_DEFAULT_PORT))
    } else if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
        (endpoint.to_string(), None)
    } else {
        return Err(invalid(
            "scheme must be hkp, hkps, http or https".to_string(),
        ));
    };

    let mut url = Url::parse(&rewritten).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    if !has_explicit_port(&rewritten)
        && let Some(port) = default_port
    {
        url.set_port(Some(port))
            .map_err(|_| invalid("cannot set port".to_string()))?;
    }
    Ok(url)
}

// Url drops a port equal to the scheme default, so look at the text instead.
fn has_explicit_port(url: &str) -> bool {
    let authority = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    authority
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok())
}

/// Queries every configured keyserver concurrently.
///
/// All requests run to completion (or timeout) before a result is chosen,
/// and the first successful endpoint in configured order wins, so the
/// answer does not depend on which server happens to respond first.
#[derive(Clone)]
pub struct KeyserverPool {
    endpoints: Vec<Arc<dyn Keyserver>>,
    timeout: Duration,
}

impl KeyserverPool {
    pub fn new(endpoints: Vec<Arc<dyn Keyserver>>, timeout: Duration) -> Self {
        Self { endpoints, timeout }
    }

    /// Builds a pool of HKP endpoints sharing one HTTP client.
    pub fn hkp<I, S>(endpoints: I, timeout: Duration) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let endpoints = endpoints
            .into_iter()
            .map(|endpoint| {
                HkpKeyserver::new(endpoint.as_ref(), client.clone())
                    .map(|ks| Arc::new(ks) as Arc<dyn Keyserver>)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(endpoints, timeout))
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|ks| ks.endpoint())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Looks `fingerprint` up on every endpoint.
    ///
    /// Returns `None` when no endpoint produced a key; individual endpoint
    /// failures are logged, never returned.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<KeyBlob> {
        let attempts = self.endpoints.iter().map(|ks| async move {
            match tokio::time::timeout(self.timeout, ks.fetch(fingerprint)).await {
                Ok(result) => result,
                Err(_) => Err(EndpointError::Timeout(self.timeout)),
            }
        });
        let results = join_all(attempts).await;

        select_first(
            self.endpoints.iter().map(|ks| ks.endpoint()).zip(results),
            fingerprint,
        )
    }
}

fn select_first<'a, I>(results: I, fingerprint: &Fingerprint) -> Option<KeyBlob>
where
    I: IntoIterator<Item = (&'a str, std::result::Result<String, EndpointError>)>,
{
    let mut chosen = None;

    for (endpoint, result) in results {
        match result {
            Ok(armored) if armored.trim().is_empty() => {
                debug!(endpoint, %fingerprint, "empty answer");
            }
            Ok(armored) if chosen.is_none() => {
                debug!(endpoint, %fingerprint, "key found");
                chosen = Some(KeyBlob {
                    endpoint: endpoint.to_string(),
                    armored,
                });
            }
            Ok(_) => {
                debug!(endpoint, %fingerprint, "ignoring answer from lower-priority endpoint");
            }
            Err(EndpointError::NotFound) => {
                debug!(endpoint, %fingerprint, "key not on endpoint");
            }
            Err(e) => {
                warn!(endpoint, %fingerprint, error = %e, "keyserver lookup failed");
            }
        }
    }

    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPR: &str = "ABAF11C65A2970B130ABE3C479BE3E4300411886";

    struct Fixed {
        name: String,
        delay: Duration,
        answer: Option<String>,
    }

    impl Fixed {
        fn ok(name: &str, body: &str) -> Arc<dyn Keyserver> {
            Self::delayed(name, Duration::ZERO, Some(body))
        }

        fn missing(name: &str) -> Arc<dyn Keyserver> {
            Self::delayed(name, Duration::ZERO, None)
        }

        fn delayed(name: &str, delay: Duration, body: Option<&str>) -> Arc<dyn Keyserver> {
            Arc::new(Self {
                name: name.to_string(),
                delay,
                answer: body.map(str::to_string),
            })
        }
    }

    #[async_trait]
    impl Keyserver for Fixed {
        fn endpoint(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, _: &Fingerprint) -> std::result::Result<String, EndpointError> {
            tokio::time::sleep(self.delay).await;
            self.answer.clone().ok_or(EndpointError::NotFound)
        }
    }

    fn fpr() -> Fingerprint {
        Fingerprint::parse(FPR).unwrap()
    }

    #[tokio::test]
    async fn test_all_endpoints_absent() {
        let pool = KeyserverPool::new(
            vec![Fixed::missing("a"), Fixed::missing("b"), Fixed::missing("c")],
            DEFAULT_TIMEOUT,
        );
        assert_eq!(pool.lookup(&fpr()).await, None);
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let pool = KeyserverPool::new(Vec::new(), DEFAULT_TIMEOUT);
        assert_eq!(pool.lookup(&fpr()).await, None);
    }

    #[tokio::test]
    async fn test_single_success_in_any_position() {
        for position in 0..4 {
            let endpoints = (0..4)
                .map(|i| {
                    let name = format!("ks{i}");
                    if i == position {
                        Fixed::ok(&name, "KEY")
                    } else {
                        Fixed::missing(&name)
                    }
                })
                .collect();
            let pool = KeyserverPool::new(endpoints, DEFAULT_TIMEOUT);

            let blob = pool.lookup(&fpr()).await.unwrap();
            assert_eq!(blob.endpoint, format!("ks{position}"));
            assert_eq!(blob.armored, "KEY");
        }
    }

    #[tokio::test]
    async fn test_priority_order_beats_response_order() {
        let pool = KeyserverPool::new(
            vec![
                Fixed::missing("first"),
                Fixed::delayed("slow", Duration::from_millis(50), Some("SLOW")),
                Fixed::ok("fast", "FAST"),
            ],
            DEFAULT_TIMEOUT,
        );

        let blob = pool.lookup(&fpr()).await.unwrap();
        assert_eq!(blob.endpoint, "slow");
        assert_eq!(blob.armored, "SLOW");
    }

    #[tokio::test]
    async fn test_blank_answer_is_absent() {
        let pool = KeyserverPool::new(
            vec![Fixed::ok("blank", "  \n"), Fixed::ok("real", "KEY")],
            DEFAULT_TIMEOUT,
        );
        assert_eq!(pool.lookup(&fpr()).await.unwrap().endpoint, "real");
    }

    #[tokio::test]
    async fn test_timeout_counts_as_absent() {
        let pool = KeyserverPool::new(
            vec![
                Fixed::delayed("stuck", Duration::from_secs(30), Some("LATE")),
                Fixed::ok("quick", "KEY"),
            ],
            Duration::from_millis(50),
        );

        let started = std::time::Instant::now();
        let blob = pool.lookup(&fpr()).await.unwrap();
        assert_eq!(blob.endpoint, "quick");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_hkp_url_mapping() {
        let client = Client::new();
        let fpr = fpr();

        let hkps = HkpKeyserver::new("hkps://keys.openpgp.org", client.clone()).unwrap();
        assert_eq!(
            hkps.lookup_url(&fpr).as_str(),
            format!("https://keys.openpgp.org/pks/lookup?op=get&options=mr&search=0x{FPR}")
        );

        let hkp = HkpKeyserver::new("hkp://pool.example.net", client.clone()).unwrap();
        assert!(
            hkp.lookup_url(&fpr)
                .as_str()
                .starts_with("http://pool.example.net:11371/pks/lookup?")
        );

        let hkp_port = HkpKeyserver::new("hkp://pool.example.net:80", client.clone()).unwrap();
        assert!(
            hkp_port
                .lookup_url(&fpr)
                .as_str()
                .starts_with("http://pool.example.net/pks/lookup?")
        );

        let http = HkpKeyserver::new("http://127.0.0.1:8080", client.clone()).unwrap();
        assert!(
            http.lookup_url(&fpr)
                .as_str()
                .starts_with("http://127.0.0.1:8080/pks/lookup?")
        );
    }

    #[test]
    fn test_hkp_url_keeps_base_path() {
        let client = Client::new();
        let fpr = fpr();

        for endpoint in ["https://example.org/keys", "https://example.org/keys/"] {
            let ks = HkpKeyserver::new(endpoint, client.clone()).unwrap();
            assert!(
                ks.lookup_url(&fpr)
                    .as_str()
                    .starts_with("https://example.org/keys/pks/lookup?op=get"),
                "endpoint {endpoint}"
            );
        }
    }

    #[test]
    fn test_invalid_endpoints() {
        let client = Client::new();
        for endpoint in ["ftp://keys.example.org", "keys.example.org", "hkps://"] {
            let err = HkpKeyserver::new(endpoint, client.clone()).unwrap_err();
            assert!(
                matches!(err, Error::InvalidEndpoint { .. }),
                "endpoint {endpoint}"
            );
        }
    }

    #[test]
    fn test_hkp_pool_keeps_order() {
        let pool = KeyserverPool::hkp(DEFAULT_KEYSERVERS, DEFAULT_TIMEOUT).unwrap();
        let endpoints: Vec<&str> = pool.endpoints().collect();
        assert_eq!(endpoints, DEFAULT_KEYSERVERS);
    }
}
