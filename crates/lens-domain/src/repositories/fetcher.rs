use crate::repositories::cache::CacheError;
use crate::value_objects::fingerprint::RequestFingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// An outbound GET: endpoint plus query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn fingerprint(&self) -> RequestFingerprint {
        RequestFingerprint::compute(&self.endpoint, &self.params)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub fingerprint: RequestFingerprint,
    pub payload: Vec<u8>,
    /// Epoch milliseconds of the network response (original time for cache hits).
    pub fetched_at: i64,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    RateLimited,
    Unreachable,
    UpstreamError,
    DecodeError,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::RateLimited => "rate_limited",
            FetchErrorKind::Unreachable => "unreachable",
            FetchErrorKind::UpstreamError => "upstream_error",
            FetchErrorKind::DecodeError => "decode_error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rate_limited" => Some(FetchErrorKind::RateLimited),
            "unreachable" => Some(FetchErrorKind::Unreachable),
            "upstream_error" => Some(FetchErrorKind::UpstreamError),
            "decode_error" => Some(FetchErrorKind::DecodeError),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("rate limited by {host} after {attempts} attempt(s)")]
    RateLimited { host: String, attempts: u32 },
    #[error("{host} unreachable: {message}")]
    Unreachable { host: String, message: String },
    #[error("upstream {host} returned status {status}: {message}")]
    UpstreamError {
        host: String,
        status: u16,
        message: String,
    },
    #[error("failed to decode response: {0}")]
    DecodeError(String),
    /// The cache could not be read or written. Fatal for the whole run.
    #[error(transparent)]
    Storage(#[from] CacheError),
}

impl FetchError {
    pub fn kind(&self) -> Option<FetchErrorKind> {
        match self {
            FetchError::RateLimited { .. } => Some(FetchErrorKind::RateLimited),
            FetchError::Unreachable { .. } => Some(FetchErrorKind::Unreachable),
            FetchError::UpstreamError { .. } => Some(FetchErrorKind::UpstreamError),
            FetchError::DecodeError(_) => Some(FetchErrorKind::DecodeError),
            FetchError::Storage(_) => None,
        }
    }

    /// Timeouts, connection failures, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } | FetchError::Unreachable { .. } => true,
            FetchError::UpstreamError { status, .. } => *status >= 500,
            FetchError::DecodeError(_) | FetchError::Storage(_) => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Storage(_))
    }
}

/// The single gateway for network I/O.
pub trait ResponseFetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::{FetchError, FetchErrorKind, FetchRequest};
    use crate::repositories::cache::CacheError;

    #[test]
    fn builder_fingerprint_ignores_insertion_order() {
        let a = FetchRequest::new("https://x.test/k").param("b", 2).param("a", 1);
        let b = FetchRequest::new("https://x.test/k").param("a", 1).param("b", 2);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn transient_classification() {
        let rate = FetchError::RateLimited {
            host: "h".to_string(),
            attempts: 1,
        };
        let server = FetchError::UpstreamError {
            host: "h".to_string(),
            status: 503,
            message: String::new(),
        };
        let client = FetchError::UpstreamError {
            host: "h".to_string(),
            status: 404,
            message: String::new(),
        };
        assert!(rate.is_transient());
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!FetchError::DecodeError("x".to_string()).is_transient());

        let storage = FetchError::from(CacheError::Storage("disk".to_string()));
        assert!(storage.is_fatal());
        assert!(storage.kind().is_none());
    }

    #[test]
    fn kind_labels_round_trip() {
        for kind in [
            FetchErrorKind::RateLimited,
            FetchErrorKind::Unreachable,
            FetchErrorKind::UpstreamError,
            FetchErrorKind::DecodeError,
        ] {
            assert_eq!(FetchErrorKind::parse(kind.as_str()), Some(kind));
        }
    }
}
