use crate::repositories::fetcher::FetchErrorKind;
use crate::value_objects::fingerprint::RequestFingerprint;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Success,
    Error,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Success => "success",
            CacheStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(CacheStatus::Success),
            "error" => Some(CacheStatus::Error),
            _ => None,
        }
    }
}

/// Frozen response for one request fingerprint.
///
/// Success entries are never replaced; error entries may be overwritten by a
/// later attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub fingerprint: RequestFingerprint,
    pub payload: Vec<u8>,
    /// Epoch milliseconds of the network response that produced the entry.
    pub fetched_at: i64,
    pub status: CacheStatus,
    /// Network attempts spent on this fingerprint across all runs.
    pub attempts: u32,
    pub error_kind: Option<FetchErrorKind>,
}

impl CacheEntry {
    pub fn success(fingerprint: RequestFingerprint, payload: Vec<u8>, fetched_at: i64, attempts: u32) -> Self {
        Self {
            fingerprint,
            payload,
            fetched_at,
            status: CacheStatus::Success,
            attempts,
            error_kind: None,
        }
    }

    pub fn failure(
        fingerprint: RequestFingerprint,
        payload: Vec<u8>,
        fetched_at: i64,
        attempts: u32,
        kind: FetchErrorKind,
    ) -> Self {
        Self {
            fingerprint,
            payload,
            fetched_at,
            status: CacheStatus::Error,
            attempts,
            error_kind: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CacheStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    /// A prior error entry was overwritten.
    Replaced,
    /// A prior success entry was left untouched.
    Kept,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub successes: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache storage failure: {0}")]
    Storage(String),
    #[error("corrupted cache entry {fingerprint}: {reason}")]
    Corrupted { fingerprint: String, reason: String },
}

/// Persistent fingerprint -> response store.
pub trait ResponseCache: Send + Sync {
    fn get(&self, fingerprint: &RequestFingerprint) -> Result<Option<CacheEntry>, CacheError>;
    fn put(&self, entry: &CacheEntry) -> Result<PutOutcome, CacheError>;
    fn invalidate(&self, fingerprint: &RequestFingerprint) -> Result<bool, CacheError>;
    fn clear(&self) -> Result<u64, CacheError>;
    fn stats(&self) -> Result<CacheStats, CacheError>;
}
