use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A futures-listing announcement as emitted by an upstream scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementEvent {
    pub source_exchange: String,
    /// Asset ticker as announced (`PEPE`), not the target exchange contract.
    pub ticker: String,
    /// Epoch seconds UTC.
    pub announced_at: i64,
    pub title: Option<String>,
    pub url: Option<String>,
}

impl AnnouncementEvent {
    pub fn new(source_exchange: impl Into<String>, ticker: impl Into<String>, announced_at: i64) -> Self {
        Self {
            source_exchange: source_exchange.into(),
            ticker: ticker.into().trim().to_uppercase(),
            announced_at,
            title: None,
            url: None,
        }
    }

    pub fn announced_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.announced_at, 0)
    }
}
