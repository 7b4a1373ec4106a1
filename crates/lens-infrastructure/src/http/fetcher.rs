use crate::http::clock::Clock;
use crate::http::pacing::HostPacer;
use crate::http::retry::{RetryPolicy, RetryStep, RetryTracker};
use crate::http::transport::HttpTransport;
use lens_domain::repositories::cache::{CacheEntry, CacheError, ResponseCache};
use lens_domain::repositories::fetcher::{
    FetchError, FetchErrorKind, FetchRequest, FetchedResponse, ResponseFetcher,
};
use lens_domain::value_objects::fingerprint::RequestFingerprint;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MESSAGE_LIMIT: usize = 256;

/// Maps a 2xx JSON body to the error it reports in-band, if any.
pub type BodyClassifier = Arc<dyn Fn(&[u8]) -> Option<FetchErrorKind> + Send + Sync>;

/// Cache-first fetcher: the only component that talks to the network.
///
/// Success responses are served from the cache forever. Failures, including
/// errors an exchange reports inside a 2xx body, are cached too, together
/// with the attempts spent, so later runs retry a failing call only until
/// `max_total_attempts` is reached.
pub struct RateLimitedFetcher {
    cache: Arc<dyn ResponseCache>,
    transport: Arc<dyn HttpTransport>,
    pacer: Arc<HostPacer>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    classifier: Option<BodyClassifier>,
    in_flight: Mutex<HashMap<RequestFingerprint, Arc<Mutex<()>>>>,
}

/// Error entry payload.
#[derive(Debug, Serialize, Deserialize)]
struct StoredFailure {
    kind: FetchErrorKind,
    host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    message: String,
}

impl StoredFailure {
    fn from_error(err: &FetchError, host: &str) -> Option<Self> {
        let (status, message) = match err {
            FetchError::RateLimited { .. } => (Some(429), String::new()),
            FetchError::Unreachable { message, .. } => (None, message.clone()),
            FetchError::UpstreamError {
                status, message, ..
            } => (Some(*status), message.clone()),
            FetchError::DecodeError(message) => (None, message.clone()),
            FetchError::Storage(_) => return None,
        };
        Some(Self {
            kind: err.kind()?,
            host: host.to_string(),
            status,
            message,
        })
    }

    fn into_error(self, attempts: u32) -> FetchError {
        match self.kind {
            FetchErrorKind::RateLimited => FetchError::RateLimited {
                host: self.host,
                attempts,
            },
            FetchErrorKind::Unreachable => FetchError::Unreachable {
                host: self.host,
                message: self.message,
            },
            FetchErrorKind::UpstreamError => FetchError::UpstreamError {
                host: self.host,
                status: self.status.unwrap_or(0),
                message: self.message,
            },
            FetchErrorKind::DecodeError => FetchError::DecodeError(self.message),
        }
    }
}

fn replay_failure(entry: &CacheEntry, host: &str) -> FetchError {
    match serde_json::from_slice::<StoredFailure>(&entry.payload) {
        Ok(stored) => stored.into_error(entry.attempts),
        Err(_) => {
            let kind = entry.error_kind.unwrap_or(FetchErrorKind::Unreachable);
            StoredFailure {
                kind,
                host: host.to_string(),
                status: None,
                message: format!("cached {} failure", kind.as_str()),
            }
            .into_error(entry.attempts)
        }
    }
}

pub fn host_of(endpoint: &str) -> String {
    url::Url::parse(endpoint)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| endpoint.to_string())
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MESSAGE_LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

fn in_band_error(kind: FetchErrorKind, host: &str, status: u16, body: &[u8]) -> FetchError {
    match kind {
        FetchErrorKind::RateLimited => FetchError::RateLimited {
            host: host.to_string(),
            attempts: 1,
        },
        FetchErrorKind::Unreachable => FetchError::Unreachable {
            host: host.to_string(),
            message: snippet(body),
        },
        FetchErrorKind::UpstreamError => FetchError::UpstreamError {
            host: host.to_string(),
            status,
            message: snippet(body),
        },
        FetchErrorKind::DecodeError => FetchError::DecodeError(snippet(body)),
    }
}

struct AttemptFailure {
    error: FetchError,
    retry_after: Option<Duration>,
}

impl RateLimitedFetcher {
    pub fn new(
        cache: Arc<dyn ResponseCache>,
        transport: Arc<dyn HttpTransport>,
        pacer: Arc<HostPacer>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            transport,
            pacer,
            clock,
            retry,
            classifier: None,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Bodies the classifier flags are treated like the matching HTTP
    /// failure: retried when transient and cached as error entries.
    pub fn with_classifier(mut self, classifier: BodyClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// A corrupted row is dropped and treated as a miss.
    fn cached(&self, fingerprint: &RequestFingerprint) -> Result<Option<CacheEntry>, FetchError> {
        match self.cache.get(fingerprint) {
            Ok(entry) => Ok(entry),
            Err(CacheError::Corrupted { reason, .. }) => {
                metrics::counter!("lens.cache.corrupted_total").increment(1);
                tracing::warn!(fingerprint = %fingerprint, reason = %reason, "dropping corrupted cache entry");
                self.cache.invalidate(fingerprint)?;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn hit(entry: CacheEntry) -> FetchedResponse {
        metrics::counter!("lens.cache.hits_total").increment(1);
        FetchedResponse {
            fingerprint: entry.fingerprint,
            payload: entry.payload,
            fetched_at: entry.fetched_at,
            from_cache: true,
        }
    }

    fn flight_slot(&self, fingerprint: &RequestFingerprint) -> Arc<Mutex<()>> {
        let mut slots = self.in_flight.lock();
        Arc::clone(slots.entry(fingerprint.clone()).or_default())
    }

    fn release_slot(&self, fingerprint: &RequestFingerprint, slot: Arc<Mutex<()>>) {
        let mut slots = self.in_flight.lock();
        drop(slot);
        if slots
            .get(fingerprint)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            slots.remove(fingerprint);
        }
    }

    fn attempt(&self, request: &FetchRequest, host: &str) -> Result<Vec<u8>, AttemptFailure> {
        metrics::counter!("lens.fetch.network_attempts_total").increment(1);
        let response = self
            .transport
            .get(&request.endpoint, &request.params)
            .map_err(|message| AttemptFailure {
                error: FetchError::Unreachable {
                    host: host.to_string(),
                    message,
                },
                retry_after: None,
            })?;

        match response.status {
            200..=299 => {
                serde_json::from_slice::<serde_json::Value>(&response.body).map_err(|err| {
                    AttemptFailure {
                        error: FetchError::DecodeError(format!("response from {host} is not JSON: {err}")),
                        retry_after: None,
                    }
                })?;
                match self.classifier.as_ref().and_then(|classify| classify(&response.body)) {
                    Some(kind) => {
                        metrics::counter!("lens.fetch.in_band_errors_total", "kind" => kind.as_str())
                            .increment(1);
                        Err(AttemptFailure {
                            error: in_band_error(kind, host, response.status, &response.body),
                            retry_after: None,
                        })
                    }
                    None => Ok(response.body),
                }
            }
            429 => Err(AttemptFailure {
                error: FetchError::RateLimited {
                    host: host.to_string(),
                    attempts: 1,
                },
                retry_after: response.retry_after,
            }),
            status => Err(AttemptFailure {
                error: FetchError::UpstreamError {
                    host: host.to_string(),
                    status,
                    message: snippet(&response.body),
                },
                retry_after: None,
            }),
        }
    }

    fn fetch_exclusive(
        &self,
        request: &FetchRequest,
        fingerprint: &RequestFingerprint,
        host: &str,
    ) -> Result<FetchedResponse, FetchError> {
        let prior = match self.cached(fingerprint)? {
            Some(entry) if entry.is_success() => return Ok(Self::hit(entry)),
            other => other,
        };
        let spent = prior.as_ref().map_or(0, |entry| entry.attempts);
        let allowed = self.retry.attempts_allowed(spent);

        if allowed == 0 {
            if let Some(entry) = prior.as_ref() {
                metrics::counter!("lens.cache.replayed_errors_total").increment(1);
                tracing::debug!(
                    fingerprint = %fingerprint,
                    attempts = entry.attempts,
                    "retry budget exhausted, replaying cached failure"
                );
                return Err(replay_failure(entry, host));
            }
        }
        metrics::counter!("lens.cache.misses_total").increment(1);

        let mut tracker = RetryTracker::new(self.retry, allowed);
        let mut last_error: Option<FetchError> = None;

        while let Some(attempt) = tracker.begin_attempt() {
            self.pacer.acquire(host);
            match self.attempt(request, host) {
                Ok(payload) => {
                    tracker.succeed();
                    let entry = CacheEntry::success(
                        fingerprint.clone(),
                        payload,
                        self.clock.now_ms(),
                        spent + tracker.attempts(),
                    );
                    self.cache.put(&entry)?;
                    return Ok(FetchedResponse {
                        fingerprint: entry.fingerprint,
                        payload: entry.payload,
                        fetched_at: entry.fetched_at,
                        from_cache: false,
                    });
                }
                Err(failure) => {
                    let step = tracker.fail(failure.error.is_transient());
                    if let RetryStep::Backoff(backoff) = step {
                        let delay = failure
                            .retry_after
                            .map_or(backoff, |hint| hint.min(self.retry.max_backoff).max(backoff));
                        let kind = failure.error.kind().map_or("storage", |k| k.as_str());
                        metrics::counter!("lens.fetch.retries_total", "kind" => kind).increment(1);
                        tracing::warn!(
                            host = %host,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %failure.error,
                            "transient fetch failure, backing off"
                        );
                        self.clock.sleep(delay);
                    }
                    last_error = Some(failure.error);
                }
            }
        }

        let error = match last_error {
            Some(FetchError::RateLimited { host, .. }) => FetchError::RateLimited {
                host,
                attempts: spent + tracker.attempts(),
            },
            Some(err) => err,
            None => FetchError::Unreachable {
                host: host.to_string(),
                message: "retry budget exhausted before any attempt".to_string(),
            },
        };

        if let Some(stored) = StoredFailure::from_error(&error, host) {
            let payload = serde_json::to_vec(&stored)
                .map_err(|err| FetchError::DecodeError(format!("failed to encode failure: {err}")))?;
            let entry = CacheEntry::failure(
                fingerprint.clone(),
                payload,
                self.clock.now_ms(),
                spent + tracker.attempts(),
                stored.kind,
            );
            self.cache.put(&entry)?;
        }
        Err(error)
    }
}

impl ResponseFetcher for RateLimitedFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        let fingerprint = request.fingerprint();
        let host = host_of(&request.endpoint);
        let span = tracing::info_span!(
            "infra.fetch",
            host = %host,
            fingerprint = %fingerprint,
        );
        let _enter = span.enter();
        let start = Instant::now();

        if let Some(entry) = self.cached(&fingerprint)?.filter(CacheEntry::is_success) {
            return Ok(Self::hit(entry));
        }

        let slot = self.flight_slot(&fingerprint);
        let result = {
            let _guard = slot.lock();
            self.fetch_exclusive(request, &fingerprint, &host)
        };
        self.release_slot(&fingerprint, slot);

        let label = match &result {
            Ok(response) if response.from_cache => "cached",
            Ok(_) => "ok",
            Err(_) => "err",
        };
        metrics::counter!("lens.fetch.calls_total", "result" => label).increment(1);
        metrics::histogram!("lens.fetch.latency_ms").record(start.elapsed().as_secs_f64() * 1000.0);
        if let Err(err) = &result {
            tracing::debug!(error = %err, "fetch failed");
        }
        result
    }
}
