use serde::{Deserialize, Serialize};

pub const MINUTE_SECONDS: i64 = 60;

pub fn floor_to_minute(timestamp: i64) -> i64 {
    timestamp - timestamp.rem_euclid(MINUTE_SECONDS)
}

/// One-minute candle reduced to what the reaction metrics need.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Minute-aligned open time, epoch seconds UTC.
    pub open_time: i64,
    pub close: f64,
}

impl Candle {
    pub fn new(open_time: i64, close: f64) -> Self {
        Self { open_time, close }
    }
}

/// A run of missing minutes between two present candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesGap {
    pub after: i64,
    pub before: i64,
    pub missing_minutes: i64,
}

/// Ordered candles for one symbol over `[window_start, window_end]`.
///
/// Open times are strictly increasing. Missing minutes stay missing; nothing
/// here ever fills a gap with a price.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    symbol: String,
    window_start: i64,
    window_end: i64,
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Builds a series from arbitrary candles. Later entries win over earlier
    /// entries with the same open time; candles outside the window and
    /// non-finite closes are dropped.
    pub fn from_candles(
        symbol: impl Into<String>,
        window_start: i64,
        window_end: i64,
        candles: impl IntoIterator<Item = Candle>,
    ) -> Self {
        let mut by_time = std::collections::BTreeMap::new();
        for candle in candles {
            let open_time = floor_to_minute(candle.open_time);
            if open_time < window_start || open_time > window_end || !candle.close.is_finite() {
                continue;
            }
            by_time.insert(open_time, candle.close);
        }
        Self {
            symbol: symbol.into(),
            window_start,
            window_end,
            candles: by_time
                .into_iter()
                .map(|(open_time, close)| Candle { open_time, close })
                .collect(),
        }
    }

    pub fn empty(symbol: impl Into<String>, window_start: i64, window_end: i64) -> Self {
        Self {
            symbol: symbol.into(),
            window_start,
            window_end,
            candles: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn window_start(&self) -> i64 {
        self.window_start
    }

    pub fn window_end(&self) -> i64 {
        self.window_end
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Candles with `from <= open_time <= to`.
    pub fn range(&self, from: i64, to: i64) -> &[Candle] {
        if from > to {
            return &[];
        }
        let lo = self.candles.partition_point(|c| c.open_time < from);
        let hi = self.candles.partition_point(|c| c.open_time <= to);
        &self.candles[lo..hi]
    }

    pub fn latest_at_or_before(&self, timestamp: i64) -> Option<&Candle> {
        let idx = self.candles.partition_point(|c| c.open_time <= timestamp);
        idx.checked_sub(1).map(|i| &self.candles[i])
    }

    pub fn earliest_at_or_after(&self, timestamp: i64) -> Option<&Candle> {
        let idx = self.candles.partition_point(|c| c.open_time < timestamp);
        self.candles.get(idx)
    }

    pub fn close_at(&self, open_time: i64) -> Option<f64> {
        self.candles
            .binary_search_by_key(&open_time, |c| c.open_time)
            .ok()
            .map(|i| self.candles[i].close)
    }

    pub fn gaps(&self) -> Vec<SeriesGap> {
        self.candles
            .windows(2)
            .filter_map(|pair| {
                let diff = pair[1].open_time - pair[0].open_time;
                (diff > MINUTE_SECONDS).then(|| SeriesGap {
                    after: pair[0].open_time,
                    before: pair[1].open_time,
                    missing_minutes: diff / MINUTE_SECONDS - 1,
                })
            })
            .collect()
    }

    pub fn missing_minutes(&self) -> i64 {
        self.gaps().iter().map(|g| g.missing_minutes).sum()
    }
}
