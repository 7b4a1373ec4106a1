use reqwest::blocking::Client;
use reqwest::header::RETRY_AFTER;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Parsed `Retry-After` seconds, when the upstream sent one.
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            retry_after: None,
        }
    }
}

/// A single GET with no retries. `Err` means no HTTP response arrived
/// (timeout, DNS, connection reset).
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, query: &BTreeMap<String, String>) -> Result<HttpResponse, String>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout_ms: u64, user_agent: &str) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(user_agent)
            .build()
            .map_err(|err| format!("failed to build http client: {err}"))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, query: &BTreeMap<String, String>) -> Result<HttpResponse, String> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|err| format!("request to {url} failed: {err}"))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .bytes()
            .map_err(|err| format!("failed to read body from {url}: {err}"))?
            .to_vec();

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}
