use crate::value_objects::candle::{Candle, CandleSeries, MINUTE_SECONDS};
use crate::value_objects::reaction::{MicroHighNote, MicroHighs, PricePoint};

const BUCKET_SECONDS: i64 = 3 * MINUTE_SECONDS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MicroHighPolicy {
    /// Highs are searched in `[t, t + window]`.
    pub window_seconds: i64,
    /// Three-minute buckets after a candidate in which its pullback must show.
    pub lookahead_bars: usize,
    /// Fraction below the candidate's bucket close that counts as a pullback.
    pub min_pullback_pct: f64,
}

impl Default for MicroHighPolicy {
    fn default() -> Self {
        Self {
            window_seconds: 60 * MINUTE_SECONDS,
            lookahead_bars: 4,
            min_pullback_pct: 0.0,
        }
    }
}

/// Three-minute bucket closed by its last one-minute candle.
struct Bucket<'a> {
    start: i64,
    close: f64,
    candles: &'a [Candle],
}

struct ConfirmedHigh {
    high: PricePoint,
    pullback_low: Option<PricePoint>,
}

impl ConfirmedHigh {
    fn pullback(&self) -> f64 {
        self.pullback_low
            .map_or(f64::NEG_INFINITY, |low| self.high.close - low.close)
    }
}

fn bucket_start(open_time: i64) -> i64 {
    open_time - open_time.rem_euclid(BUCKET_SECONDS)
}

fn buckets(candles: &[Candle]) -> Vec<Bucket<'_>> {
    candles
        .chunk_by(|a, b| bucket_start(a.open_time) == bucket_start(b.open_time))
        .filter_map(|chunk| {
            let last = chunk.last()?;
            Some(Bucket {
                start: bucket_start(last.open_time),
                close: last.close,
                candles: chunk,
            })
        })
        .collect()
}

/// A bucket qualifies when its close beats the previous bucket, is not beaten
/// by the next one, and some bucket within the lookahead closes below the
/// pullback threshold. The reported high is the best minute inside it.
fn confirm(buckets: &[Bucket<'_>], policy: &MicroHighPolicy) -> Vec<(i64, PricePoint)> {
    let mut confirmed = Vec::new();
    for idx in 1..buckets.len().saturating_sub(1) {
        let current = &buckets[idx];
        if !(current.close > buckets[idx - 1].close && current.close >= buckets[idx + 1].close) {
            continue;
        }
        let threshold = current.close * (1.0 - policy.min_pullback_pct);
        let horizon = (idx + 1 + policy.lookahead_bars).min(buckets.len());
        if !buckets[idx + 1..horizon].iter().any(|b| b.close < threshold) {
            continue;
        }
        if let Some(high) = pick(current.candles, |a, b| a > b) {
            confirmed.push((current.start, high));
        }
    }
    confirmed
}

/// Confirmed micro-high with the deepest pullback, plus the plain window high.
/// Each high is paired with the lowest close that followed it; a micro-high's
/// pullback search stops at the next confirmed bucket.
pub fn compute_micro_highs(
    series: &CandleSeries,
    window_start: i64,
    window_end: i64,
    policy: &MicroHighPolicy,
) -> MicroHighs {
    let window = series.range(window_start, window_end);
    let Some(window_high) = pick(window, |a, b| a > b) else {
        return MicroHighs {
            notes: vec![MicroHighNote::NoCandlesInWindow],
            ..MicroHighs::default()
        };
    };

    let mut notes = Vec::new();
    let low_after_window_high = pick(after(window, window_high.time), |a, b| a < b);
    if low_after_window_high.is_none() {
        notes.push(MicroHighNote::WindowHighAtEnd);
    }

    let candidates = confirm(&buckets(window), policy);
    let highs: Vec<ConfirmedHigh> = candidates
        .iter()
        .enumerate()
        .map(|(idx, &(_, high))| {
            let boundary = candidates.get(idx + 1).map_or(window_end, |next| next.0);
            let from = window.partition_point(|c| c.open_time < high.time + MINUTE_SECONDS);
            let to = window.partition_point(|c| c.open_time < boundary);
            ConfirmedHigh {
                high,
                pullback_low: pick(window.get(from..to).unwrap_or(&[]), |a, b| a < b),
            }
        })
        .collect();

    let best = highs.iter().fold(None::<&ConfirmedHigh>, |best, candidate| match best {
        Some(b) if candidate.pullback() <= b.pullback() => Some(b),
        _ => Some(candidate),
    });
    if best.is_none() {
        notes.push(MicroHighNote::NoConfirmedMicroHighs);
    }

    MicroHighs {
        micro_high: best.map(|h| h.high),
        low_after_micro_high: best.and_then(|h| h.pullback_low),
        window_high: Some(window_high),
        low_after_window_high,
        notes,
    }
}

fn after(window: &[Candle], time: i64) -> &[Candle] {
    let idx = window.partition_point(|c| c.open_time <= time);
    &window[idx..]
}

/// First candle whose close beats every earlier one under `better`.
fn pick(candles: &[Candle], better: impl Fn(f64, f64) -> bool) -> Option<PricePoint> {
    candles.iter().fold(None, |best: Option<PricePoint>, c| match best {
        Some(b) if !better(c.close, b.close) => Some(b),
        _ => Some(PricePoint {
            time: c.open_time,
            close: c.close,
        }),
    })
}
