use lens_domain::repositories::cache::CacheError;
use lens_domain::repositories::fetcher::{FetchError, ResponseFetcher};
use lens_domain::repositories::klines::{AdapterError, KlineAdapter};
use lens_domain::services::contracts::rank_contract_candidates;
use lens_domain::services::series::{reconcile, CandleBatch};
use lens_domain::value_objects::candle::{floor_to_minute, CandleSeries, MINUTE_SECONDS};
use lens_domain::value_objects::contract::ContractInfo;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info_span;

#[derive(Debug, Clone, Error)]
pub enum SeriesError {
    #[error("unknown contract symbol {0}")]
    SymbolUnknown(String),
    #[error("no candles for {symbol} in [{start}, {end}]")]
    NoData { symbol: String, start: i64, end: i64 },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Builds one-minute close series through the shared fetcher, one page per
/// `max_candles_per_request` minutes.
#[derive(Clone)]
pub struct SeriesBuilder {
    fetcher: Arc<dyn ResponseFetcher>,
    adapter: Arc<dyn KlineAdapter>,
    /// Contract listing, loaded on first use. `Some(empty)` once loading failed.
    contracts: Arc<Mutex<Option<Arc<Vec<ContractInfo>>>>>,
}

impl SeriesBuilder {
    pub fn new(fetcher: Arc<dyn ResponseFetcher>, adapter: Arc<dyn KlineAdapter>) -> Self {
        Self {
            fetcher,
            adapter,
            contracts: Arc::new(Mutex::new(None)),
        }
    }

    pub fn adapter(&self) -> &dyn KlineAdapter {
        self.adapter.as_ref()
    }

    /// Symbols to try for `ticker`, best first: ranked matches from the
    /// exchange's contract listing, then the adapter's conventional symbol.
    /// A listing that cannot be fetched or parsed only drops the ranked part.
    pub fn contract_candidates(&self, ticker: &str) -> Result<Vec<String>, CacheError> {
        let contracts = self.contracts()?;
        let mut candidates = rank_contract_candidates(ticker, &contracts);
        let conventional = self.adapter.contract_symbol(ticker);
        if !candidates.contains(&conventional) {
            candidates.push(conventional);
        }
        Ok(candidates)
    }

    fn contracts(&self) -> Result<Arc<Vec<ContractInfo>>, CacheError> {
        let mut slot = self.contracts.lock();
        if let Some(contracts) = slot.as_ref() {
            return Ok(Arc::clone(contracts));
        }
        let contracts = match self.adapter.contracts_request() {
            None => Vec::new(),
            Some(request) => match self.fetcher.fetch(&request) {
                Ok(response) => self
                    .adapter
                    .parse_contracts(&response.payload)
                    .unwrap_or_else(|err| {
                        tracing::warn!(error = %err, "unreadable contract listing, using conventional symbols");
                        Vec::new()
                    }),
                Err(FetchError::Storage(err)) => return Err(err),
                Err(err) => {
                    tracing::warn!(error = %err, "contract listing unavailable, using conventional symbols");
                    Vec::new()
                }
            },
        };
        tracing::debug!(exchange = %self.adapter.name(), contracts = contracts.len(), "loaded contract listing");
        let contracts = Arc::new(contracts);
        *slot = Some(Arc::clone(&contracts));
        Ok(contracts)
    }

    /// Page bounds covering `[start, end]`, both minute-aligned.
    pub fn pages(&self, start: i64, end: i64) -> Vec<(i64, i64)> {
        let span = self.adapter.max_candles_per_request().max(1) as i64 * MINUTE_SECONDS;
        let mut pages = Vec::new();
        let mut page_start = start;
        while page_start <= end {
            let page_end = (page_start + span - MINUTE_SECONDS).min(end);
            pages.push((page_start, page_end));
            page_start = page_end + MINUTE_SECONDS;
        }
        pages
    }

    pub fn build(&self, symbol: &str, window_start: i64, window_end: i64) -> Result<CandleSeries, SeriesError> {
        let start = floor_to_minute(window_start);
        let end = floor_to_minute(window_end);
        let _span = info_span!(
            "series.build",
            exchange = %self.adapter.name(),
            symbol = %symbol,
            start = start,
            end = end
        )
        .entered();
        let started = Instant::now();

        let mut batches = Vec::new();
        let mut seen_payloads: HashSet<Vec<u8>> = HashSet::new();

        for (sequence, (page_start, page_end)) in self.pages(start, end).into_iter().enumerate() {
            let request = self.adapter.request(symbol, page_start, page_end);
            let response = self.fetcher.fetch(&request)?;
            metrics::counter!("lens.series.pages_total").increment(1);

            let candles = self
                .adapter
                .parse(symbol, &response.payload)
                .map_err(|err| match err {
                    AdapterError::UnknownSymbol(symbol) => SeriesError::SymbolUnknown(symbol),
                    AdapterError::Malformed(message) => {
                        SeriesError::Fetch(FetchError::DecodeError(message))
                    }
                })?;

            if candles.is_empty() {
                continue;
            }
            if !seen_payloads.insert(response.payload) {
                metrics::counter!("lens.series.repeated_pages_total").increment(1);
                tracing::warn!(
                    page_start,
                    page_end,
                    "upstream returned an identical page for different bounds, ignoring it"
                );
                continue;
            }
            batches.push(CandleBatch {
                fetched_at: response.fetched_at,
                sequence,
                candles,
            });
        }

        let (series, report) = reconcile(symbol, start, end, batches);
        metrics::histogram!("lens.series.build_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(
            candles = series.len(),
            input = report.input,
            duplicates = report.duplicates,
            out_of_window = report.out_of_window,
            invalid_close = report.invalid_close,
            missing_minutes = series.missing_minutes(),
            "built candle series"
        );

        if series.is_empty() {
            return Err(SeriesError::NoData {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(series)
    }
}
