use crate::value_objects::candle::CandleSeries;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Tradable,
    /// No candle anywhere in the lookback window.
    NotYetListed,
    /// Older data exists but the minutes right before the announcement are
    /// missing. Treated as an outage, never as a non-listing.
    Indeterminate,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Tradable => "tradable",
            ListingStatus::NotYetListed => "not_yet_listed",
            ListingStatus::Indeterminate => "indeterminate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingPolicy {
    /// How far before the announcement to look for any trading.
    pub lookback_seconds: i64,
    /// A candle must exist at least this long before the announcement.
    pub minimum_lookback_seconds: i64,
    /// Largest silence tolerated between the last candle and the boundary.
    pub boundary_tolerance_seconds: i64,
}

impl Default for ListingPolicy {
    fn default() -> Self {
        Self {
            lookback_seconds: 2 * 3600,
            minimum_lookback_seconds: 60,
            boundary_tolerance_seconds: 10 * 60,
        }
    }
}

impl ListingPolicy {
    /// `[t - lookback, t - minimum_lookback]`.
    pub fn window(&self, announced_at: i64) -> (i64, i64) {
        (
            announced_at - self.lookback_seconds,
            announced_at - self.minimum_lookback_seconds,
        )
    }
}

/// Classifies listing state from whatever part of `series` falls inside the
/// policy window, so a wider reaction series can be passed as-is.
pub fn classify_listing(series: &CandleSeries, announced_at: i64, policy: &ListingPolicy) -> ListingStatus {
    let (start, boundary) = policy.window(announced_at);
    let Some(latest) = series.range(start, boundary).last() else {
        return ListingStatus::NotYetListed;
    };
    if latest.open_time < boundary - policy.boundary_tolerance_seconds {
        return ListingStatus::Indeterminate;
    }
    ListingStatus::Tradable
}
