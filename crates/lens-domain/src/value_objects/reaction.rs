use crate::value_objects::duration::parse_duration_minutes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset after the announcement at which a return is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Horizon {
    minutes: u32,
}

impl Horizon {
    pub fn from_minutes(minutes: u32) -> Result<Self, String> {
        if minutes == 0 {
            return Err("horizon must be at least one minute".to_string());
        }
        Ok(Self { minutes })
    }

    pub fn parse(label: &str) -> Result<Self, String> {
        let minutes = parse_duration_minutes(label)?;
        let minutes = u32::try_from(minutes).map_err(|_| format!("horizon too large: {label}"))?;
        Self::from_minutes(minutes)
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn seconds(&self) -> i64 {
        i64::from(self.minutes) * 60
    }

    /// Column-safe label, always in minutes (`5m`, `240m`).
    pub fn label(&self) -> String {
        format!("{}m", self.minutes)
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}m", self.minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    pub time: i64,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HorizonReturn {
    pub horizon: Horizon,
    /// `close / baseline - 1`; `None` when no candle fell inside the tolerance.
    pub value: Option<f64>,
    pub observed: Option<PricePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSufficiency {
    Complete,
    Partial,
}

impl DataSufficiency {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSufficiency::Complete => "complete",
            DataSufficiency::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MicroHighNote {
    NoCandlesInWindow,
    WindowHighAtEnd,
    NoConfirmedMicroHighs,
}

impl MicroHighNote {
    pub fn as_str(&self) -> &'static str {
        match self {
            MicroHighNote::NoCandlesInWindow => "no candles in window",
            MicroHighNote::WindowHighAtEnd => "window high at end of window",
            MicroHighNote::NoConfirmedMicroHighs => "no confirmed micro highs",
        }
    }
}

/// Post-announcement highs, each with the lowest close that followed it.
/// `micro_high` is the confirmed local high with the deepest pullback,
/// `window_high` the plain maximum of the window.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MicroHighs {
    pub micro_high: Option<PricePoint>,
    pub low_after_micro_high: Option<PricePoint>,
    pub window_high: Option<PricePoint>,
    pub low_after_window_high: Option<PricePoint>,
    pub notes: Vec<MicroHighNote>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionRecord {
    pub symbol: String,
    pub announced_at: i64,
    pub baseline: PricePoint,
    pub horizons: Vec<HorizonReturn>,
    pub sufficiency: DataSufficiency,
    pub pre_ma5: Option<f64>,
    pub micro_highs: MicroHighs,
}

impl ReactionRecord {
    pub fn baseline_price(&self) -> f64 {
        self.baseline.close
    }

    pub fn horizon_return(&self, horizon: Horizon) -> Option<f64> {
        self.horizons
            .iter()
            .find(|h| h.horizon == horizon)
            .and_then(|h| h.value)
    }
}
