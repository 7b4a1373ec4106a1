use crate::config::DatasetSettings;
use crate::series::{SeriesBuilder, SeriesError};
use lens_domain::repositories::cache::CacheError;
use lens_domain::repositories::dataset::DatasetSink;
use lens_domain::repositories::fetcher::FetchError;
use lens_domain::services::audit::{AuditAction, AuditEvent};
use lens_domain::services::listing::{classify_listing, ListingStatus};
use lens_domain::services::reaction::{ReactionEngine, ReactionError};
use lens_domain::value_objects::announcement::AnnouncementEvent;
use lens_domain::value_objects::candle::{floor_to_minute, CandleSeries};
use lens_domain::value_objects::reaction::DataSufficiency;
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;
use tracing::info_span;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("response cache failure, aborting run: {0}")]
    Storage(#[from] CacheError),
    #[error("failed to write dataset output: {0}")]
    Output(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnouncementOutcome {
    Recorded {
        symbol: String,
        sufficiency: DataSufficiency,
    },
    Excluded {
        symbol: String,
        status: ListingStatus,
    },
    Failed {
        symbol: Option<String>,
        kind: String,
        message: String,
    },
    SkippedDuplicate,
}

impl AnnouncementOutcome {
    fn action(&self) -> AuditAction {
        match self {
            AnnouncementOutcome::Recorded { .. } => AuditAction::Recorded,
            AnnouncementOutcome::Excluded {
                status: ListingStatus::Indeterminate,
                ..
            } => AuditAction::ExcludedIndeterminate,
            AnnouncementOutcome::Excluded { .. } => AuditAction::ExcludedNotYetListed,
            AnnouncementOutcome::Failed { .. } => AuditAction::Failed,
            AnnouncementOutcome::SkippedDuplicate => AuditAction::SkippedDuplicate,
        }
    }

    fn stage(&self) -> &'static str {
        match self {
            AnnouncementOutcome::Recorded { .. } => "reaction",
            AnnouncementOutcome::Excluded { .. } => "listing",
            AnnouncementOutcome::Failed { kind, .. } if kind.starts_with("insufficient") => "reaction",
            AnnouncementOutcome::Failed { .. } => "series",
            AnnouncementOutcome::SkippedDuplicate => "dedup",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeLine {
    pub source_exchange: String,
    pub ticker: String,
    pub announced_at: i64,
    pub outcome: AnnouncementOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub outcomes: Vec<OutcomeLine>,
    /// `target_rows` was reached before the input ran out.
    pub stopped_early: bool,
}

impl RunSummary {
    fn count(&self, action: AuditAction) -> usize {
        self.outcomes
            .iter()
            .filter(|line| line.outcome.action() == action)
            .count()
    }

    pub fn recorded(&self) -> usize {
        self.count(AuditAction::Recorded)
    }

    pub fn excluded_not_yet_listed(&self) -> usize {
        self.count(AuditAction::ExcludedNotYetListed)
    }

    pub fn excluded_indeterminate(&self) -> usize {
        self.count(AuditAction::ExcludedIndeterminate)
    }

    pub fn failed(&self) -> usize {
        self.count(AuditAction::Failed)
    }

    pub fn skipped_duplicates(&self) -> usize {
        self.count(AuditAction::SkippedDuplicate)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id,
            "processed": self.outcomes.len(),
            "recorded": self.recorded(),
            "excluded_not_yet_listed": self.excluded_not_yet_listed(),
            "excluded_indeterminate": self.excluded_indeterminate(),
            "failed": self.failed(),
            "skipped_duplicates": self.skipped_duplicates(),
            "stopped_early": self.stopped_early,
        })
    }
}

/// Announcement -> series -> listing check -> reaction metrics, one
/// announcement at a time.
pub struct DatasetPipeline {
    builder: SeriesBuilder,
    engine: ReactionEngine,
    settings: DatasetSettings,
}

enum CandidateCheck {
    Tradable(CandleSeries, serde_json::Value),
    Rejected(AnnouncementOutcome, serde_json::Value),
}

/// Rejection reported when no candidate traded; the lowest rank wins.
fn rejection_rank(outcome: &AnnouncementOutcome) -> u8 {
    match outcome {
        AnnouncementOutcome::Failed { kind, .. } if kind == "symbol_unknown" => 3,
        AnnouncementOutcome::Excluded {
            status: ListingStatus::NotYetListed,
            ..
        } => 2,
        AnnouncementOutcome::Excluded { .. } => 1,
        _ => 0,
    }
}

fn failure(symbol: Option<&str>, kind: &str, message: impl ToString) -> AnnouncementOutcome {
    AnnouncementOutcome::Failed {
        symbol: symbol.map(str::to_string),
        kind: kind.to_string(),
        message: message.to_string(),
    }
}

impl DatasetPipeline {
    pub fn new(builder: SeriesBuilder, settings: DatasetSettings) -> Self {
        Self {
            builder,
            engine: ReactionEngine::new(settings.reaction).with_micro_highs(settings.micro_highs),
            settings,
        }
    }

    pub fn settings(&self) -> &DatasetSettings {
        &self.settings
    }

    pub fn run(
        &self,
        announcements: &[AnnouncementEvent],
        sink: &mut dyn DatasetSink,
    ) -> Result<RunSummary, PipelineError> {
        let _span = info_span!(
            "pipeline.run",
            run_id = %self.settings.run_id,
            exchange = %self.builder.adapter().name(),
            announcements = announcements.len()
        )
        .entered();
        let started = Instant::now();

        let mut summary = RunSummary {
            run_id: self.settings.run_id.clone(),
            ..RunSummary::default()
        };
        let mut seen: HashSet<(String, String, i64)> = HashSet::new();

        for announcement in announcements {
            if let Some(target) = self.settings.target_rows {
                if summary.recorded() >= target {
                    summary.stopped_early = true;
                    tracing::info!(target, "target rows reached, stopping");
                    break;
                }
            }

            let key = (
                announcement.source_exchange.trim().to_lowercase(),
                announcement.ticker.clone(),
                floor_to_minute(announcement.announced_at),
            );
            let (outcome, details) = if seen.insert(key) {
                self.process(announcement, sink)?
            } else {
                (AnnouncementOutcome::SkippedDuplicate, serde_json::json!({}))
            };

            let action = outcome.action();
            metrics::counter!("lens.pipeline.announcements_total", "outcome" => action.as_str()).increment(1);
            sink.write_audit(&self.audit_event(announcement, &outcome, details))
                .map_err(PipelineError::Output)?;
            summary.outcomes.push(OutcomeLine {
                source_exchange: announcement.source_exchange.clone(),
                ticker: announcement.ticker.clone(),
                announced_at: announcement.announced_at,
                outcome,
            });
        }

        sink.finish().map_err(PipelineError::Output)?;
        metrics::histogram!("lens.pipeline.run_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        metrics::gauge!("lens.pipeline.recorded").set(summary.recorded() as f64);
        tracing::info!(
            recorded = summary.recorded(),
            excluded_not_yet_listed = summary.excluded_not_yet_listed(),
            excluded_indeterminate = summary.excluded_indeterminate(),
            failed = summary.failed(),
            skipped = summary.skipped_duplicates(),
            "dataset run finished"
        );
        Ok(summary)
    }

    fn process(
        &self,
        announcement: &AnnouncementEvent,
        sink: &mut dyn DatasetSink,
    ) -> Result<(AnnouncementOutcome, serde_json::Value), PipelineError> {
        let t = floor_to_minute(announcement.announced_at);
        let _span = info_span!(
            "pipeline.announcement",
            source = %announcement.source_exchange,
            ticker = %announcement.ticker,
            announced_at = t
        )
        .entered();
        let started = Instant::now();

        let candidates = self.builder.contract_candidates(&announcement.ticker)?;
        let mut rejections = Vec::with_capacity(candidates.len());
        let mut chosen = None;
        for symbol in &candidates {
            match self.check_candidate(symbol, t)? {
                CandidateCheck::Tradable(series, details) => {
                    chosen = Some((symbol, series, details));
                    break;
                }
                CandidateCheck::Rejected(outcome, details) => rejections.push((outcome, details)),
            }
        }

        let (outcome, mut details) = match chosen {
            Some((symbol, series, details)) => {
                self.measure(announcement, symbol, t, &series, details, sink)?
            }
            None => rejections
                .into_iter()
                .min_by_key(|(outcome, _)| rejection_rank(outcome))
                .unwrap_or_else(|| {
                    let message = format!(
                        "no contract for {} on {}",
                        announcement.ticker,
                        self.builder.adapter().name()
                    );
                    (failure(None, "symbol_unknown", message), serde_json::json!({}))
                }),
        };
        if candidates.len() > 1 {
            details["candidates"] = serde_json::json!(candidates);
        }
        metrics::histogram!("lens.pipeline.announcement_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);
        Ok((outcome, details))
    }

    /// Fetches the reaction series for one candidate symbol and checks that
    /// it was trading at `t`.
    fn check_candidate(&self, symbol: &str, t: i64) -> Result<CandidateCheck, PipelineError> {
        let _span = info_span!("pipeline.candidate", symbol = %symbol).entered();
        let listing = &self.settings.listing;
        let window_start = t - listing.lookback_seconds;
        let window_end = t + self.settings.reaction_span_seconds();

        let series = match self.builder.build(symbol, window_start, window_end) {
            Ok(series) => series,
            Err(SeriesError::NoData { .. }) => {
                tracing::warn!("no candles around announcement, treating as not yet listed");
                return Ok(CandidateCheck::Rejected(
                    AnnouncementOutcome::Excluded {
                        symbol: symbol.to_string(),
                        status: ListingStatus::NotYetListed,
                    },
                    serde_json::json!({ "candles": 0 }),
                ));
            }
            Err(SeriesError::SymbolUnknown(_)) => {
                tracing::warn!("contract unknown on target exchange");
                let message = format!("{symbol} is not listed on {}", self.builder.adapter().name());
                return Ok(CandidateCheck::Rejected(
                    failure(Some(symbol), "symbol_unknown", message),
                    serde_json::json!({}),
                ));
            }
            Err(SeriesError::Fetch(FetchError::Storage(err))) => {
                tracing::error!(error = %err, "cache storage failure");
                return Err(PipelineError::Storage(err));
            }
            Err(SeriesError::Fetch(err)) => {
                tracing::warn!(error = %err, "candle fetch failed");
                let kind = err.kind().map_or("fetch", |k| k.as_str());
                return Ok(CandidateCheck::Rejected(failure(Some(symbol), kind, &err), serde_json::json!({})));
            }
        };

        let status = classify_listing(&series, t, listing);
        let details = serde_json::json!({
            "candles": series.len(),
            "missing_minutes": series.missing_minutes(),
            "listing_status": status.as_str(),
        });
        if status != ListingStatus::Tradable {
            tracing::warn!(status = status.as_str(), "announcement excluded");
            return Ok(CandidateCheck::Rejected(
                AnnouncementOutcome::Excluded {
                    symbol: symbol.to_string(),
                    status,
                },
                details,
            ));
        }
        Ok(CandidateCheck::Tradable(series, details))
    }

    fn measure(
        &self,
        announcement: &AnnouncementEvent,
        symbol: &str,
        t: i64,
        series: &CandleSeries,
        mut details: serde_json::Value,
        sink: &mut dyn DatasetSink,
    ) -> Result<(AnnouncementOutcome, serde_json::Value), PipelineError> {
        let outcome = match self.engine.compute(series, t, &self.settings.horizons) {
            Ok(record) => {
                sink.write_record(announcement, &record)
                    .map_err(PipelineError::Output)?;
                details["baseline_price"] = serde_json::json!(record.baseline_price());
                details["sufficiency"] = serde_json::json!(record.sufficiency.as_str());
                AnnouncementOutcome::Recorded {
                    symbol: symbol.to_string(),
                    sufficiency: record.sufficiency,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "reaction metrics unavailable");
                let kind = match err {
                    ReactionError::InsufficientBaseline { .. } => "insufficient_baseline",
                    ReactionError::InsufficientHorizonData { .. } => "insufficient_horizon_data",
                };
                failure(Some(symbol), kind, &err)
            }
        };
        Ok((outcome, details))
    }

    fn audit_event(
        &self,
        announcement: &AnnouncementEvent,
        outcome: &AnnouncementOutcome,
        details: serde_json::Value,
    ) -> AuditEvent {
        let (symbol, error) = match outcome {
            AnnouncementOutcome::Recorded { symbol, .. } | AnnouncementOutcome::Excluded { symbol, .. } => {
                (Some(symbol.clone()), None)
            }
            AnnouncementOutcome::Failed {
                symbol,
                kind,
                message,
            } => (symbol.clone(), Some(format!("{kind}: {message}"))),
            AnnouncementOutcome::SkippedDuplicate => (None, None),
        };
        AuditEvent {
            run_id: self.settings.run_id.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            stage: outcome.stage().to_string(),
            source_exchange: announcement.source_exchange.clone(),
            ticker: announcement.ticker.clone(),
            symbol,
            announced_at: announcement.announced_at,
            action: outcome.action(),
            error,
            details,
        }
    }
}
