use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Cache key for an outbound GET request.
///
/// SHA-256 over the endpoint and the key-sorted parameter list, so parameter
/// order never changes the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    pub fn compute(endpoint: &str, params: &BTreeMap<String, String>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"GET\n");
        hasher.update(endpoint.trim().trim_end_matches('/').as_bytes());
        hasher.update(b"\n");
        let mut first = true;
        for (key, value) in params {
            if !first {
                hasher.update(b"&");
            }
            first = false;
            hasher.update(key.trim().as_bytes());
            hasher.update(b"=");
            hasher.update(value.trim().as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim().to_lowercase();
        if trimmed.len() != 64 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid fingerprint (expected 64 hex chars): {value}"));
        }
        Ok(Self(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
