use crate::value_objects::candle::{floor_to_minute, Candle, CandleSeries};
use std::collections::BTreeMap;

/// Candles decoded from one paginated response.
#[derive(Debug, Clone)]
pub struct CandleBatch {
    /// Epoch milliseconds of the response that produced the batch.
    pub fetched_at: i64,
    /// Request order within one build; breaks `fetched_at` ties.
    pub sequence: usize,
    pub candles: Vec<Candle>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub input: usize,
    pub duplicates: usize,
    pub out_of_window: usize,
    pub invalid_close: usize,
    pub first_duplicate: Option<i64>,
}

/// Merges paginated batches into one series.
///
/// Duplicated open times keep the value from the most recent fetch; among
/// equally recent fetches the later request wins.
pub fn reconcile(
    symbol: &str,
    window_start: i64,
    window_end: i64,
    mut batches: Vec<CandleBatch>,
) -> (CandleSeries, ReconcileReport) {
    batches.sort_by_key(|b| (b.fetched_at, b.sequence));

    let mut report = ReconcileReport::default();
    let mut by_time: BTreeMap<i64, Candle> = BTreeMap::new();

    for batch in &batches {
        for candle in &batch.candles {
            report.input += 1;
            if !candle.close.is_finite() {
                report.invalid_close += 1;
                continue;
            }
            let open_time = floor_to_minute(candle.open_time);
            if open_time < window_start || open_time > window_end {
                report.out_of_window += 1;
                continue;
            }
            if by_time
                .insert(open_time, Candle::new(open_time, candle.close))
                .is_some()
            {
                report.duplicates += 1;
                if report.first_duplicate.is_none() {
                    report.first_duplicate = Some(open_time);
                }
            }
        }
    }

    let series = CandleSeries::from_candles(symbol, window_start, window_end, by_time.into_values());
    (series, report)
}
