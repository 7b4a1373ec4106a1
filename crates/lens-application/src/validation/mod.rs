use crate::series::{SeriesBuilder, SeriesError};
use lens_domain::services::listing::{classify_listing, ListingPolicy, ListingStatus};
use tracing::info_span;

/// Answers "was this contract already trading when the announcement landed?".
#[derive(Clone)]
pub struct ListingValidator {
    builder: SeriesBuilder,
    policy: ListingPolicy,
}

impl ListingValidator {
    pub fn new(builder: SeriesBuilder, policy: ListingPolicy) -> Self {
        Self { builder, policy }
    }

    pub fn policy(&self) -> &ListingPolicy {
        &self.policy
    }

    /// Fetches only the listing window. An empty window is `NotYetListed`;
    /// unknown contracts and fetch failures are errors.
    pub fn was_tradable_at(&self, symbol: &str, announced_at: i64) -> Result<ListingStatus, SeriesError> {
        let _span = info_span!("listing.validate", symbol = %symbol, announced_at).entered();
        let (start, end) = self.policy.window(announced_at);
        let status = match self.builder.build(symbol, start, end) {
            Ok(series) => classify_listing(&series, announced_at, &self.policy),
            Err(SeriesError::NoData { .. }) => ListingStatus::NotYetListed,
            Err(err) => return Err(err),
        };
        tracing::debug!(status = status.as_str(), "classified listing");
        Ok(status)
    }
}
