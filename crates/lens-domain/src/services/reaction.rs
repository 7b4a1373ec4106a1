use crate::services::micro_highs::{compute_micro_highs, MicroHighPolicy};
use crate::value_objects::candle::CandleSeries;
use crate::value_objects::reaction::{
    DataSufficiency, Horizon, HorizonReturn, PricePoint, ReactionRecord,
};
use thiserror::Error;

const PRE_MEAN_BARS: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactionError {
    #[error("no usable baseline for {symbol} at {announced_at}: {reason}")]
    InsufficientBaseline {
        symbol: String,
        announced_at: i64,
        reason: String,
    },
    #[error("no horizon data for {symbol} at {announced_at}")]
    InsufficientHorizonData { symbol: String, announced_at: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionPolicy {
    /// The baseline candle must open no earlier than `t - baseline_lookback`.
    pub baseline_lookback_seconds: i64,
    /// A horizon candle may open up to this long after `t + h`.
    pub horizon_tolerance_seconds: i64,
}

impl Default for ReactionPolicy {
    fn default() -> Self {
        Self {
            baseline_lookback_seconds: 10 * 60,
            horizon_tolerance_seconds: 2 * 60,
        }
    }
}

/// Mean close of the `bars` one-minute candles ending one minute before
/// `announced_at`. Any missing minute makes the mean unavailable.
pub fn pre_announcement_mean(series: &CandleSeries, announced_at: i64, bars: usize) -> Option<f64> {
    if bars == 0 {
        return None;
    }
    let end = announced_at - 60;
    let start = end - (bars as i64 - 1) * 60;
    let window = series.range(start, end);
    if window.len() != bars {
        return None;
    }
    Some(window.iter().map(|c| c.close).sum::<f64>() / bars as f64)
}

/// Pure reaction metrics over an already-built series.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReactionEngine {
    policy: ReactionPolicy,
    micro_highs: MicroHighPolicy,
}

impl ReactionEngine {
    pub fn new(policy: ReactionPolicy) -> Self {
        Self {
            policy,
            micro_highs: MicroHighPolicy::default(),
        }
    }

    pub fn with_micro_highs(mut self, policy: MicroHighPolicy) -> Self {
        self.micro_highs = policy;
        self
    }

    pub fn policy(&self) -> &ReactionPolicy {
        &self.policy
    }

    pub fn compute(
        &self,
        series: &CandleSeries,
        announced_at: i64,
        horizons: &[Horizon],
    ) -> Result<ReactionRecord, ReactionError> {
        let baseline = self.baseline(series, announced_at)?;

        let returns: Vec<HorizonReturn> = horizons
            .iter()
            .map(|&horizon| self.horizon_return(series, announced_at, baseline, horizon))
            .collect();

        let present = returns.iter().filter(|r| r.value.is_some()).count();
        if present == 0 {
            return Err(ReactionError::InsufficientHorizonData {
                symbol: series.symbol().to_string(),
                announced_at,
            });
        }
        let sufficiency = if present == returns.len() {
            DataSufficiency::Complete
        } else {
            DataSufficiency::Partial
        };

        Ok(ReactionRecord {
            symbol: series.symbol().to_string(),
            announced_at,
            baseline,
            horizons: returns,
            sufficiency,
            pre_ma5: pre_announcement_mean(series, announced_at, PRE_MEAN_BARS),
            micro_highs: compute_micro_highs(
                series,
                announced_at,
                announced_at + self.micro_highs.window_seconds,
                &self.micro_highs,
            ),
        })
    }

    fn baseline(&self, series: &CandleSeries, announced_at: i64) -> Result<PricePoint, ReactionError> {
        let insufficient = |reason: String| ReactionError::InsufficientBaseline {
            symbol: series.symbol().to_string(),
            announced_at,
            reason,
        };

        let candle = series
            .latest_at_or_before(announced_at)
            .filter(|c| c.open_time >= announced_at - self.policy.baseline_lookback_seconds)
            .ok_or_else(|| {
                insufficient(format!(
                    "no candle within {}s before announcement",
                    self.policy.baseline_lookback_seconds
                ))
            })?;

        if !candle.close.is_finite() || candle.close <= 0.0 {
            return Err(insufficient(format!(
                "non-positive baseline close {} at {}",
                candle.close, candle.open_time
            )));
        }

        Ok(PricePoint {
            time: candle.open_time,
            close: candle.close,
        })
    }

    fn horizon_return(
        &self,
        series: &CandleSeries,
        announced_at: i64,
        baseline: PricePoint,
        horizon: Horizon,
    ) -> HorizonReturn {
        let target = announced_at + horizon.seconds();
        let observed = series
            .earliest_at_or_after(target)
            .filter(|c| c.open_time <= target + self.policy.horizon_tolerance_seconds)
            .map(|c| PricePoint {
                time: c.open_time,
                close: c.close,
            });
        HorizonReturn {
            horizon,
            value: observed.map(|p| p.close / baseline.close - 1.0),
            observed,
        }
    }
}
