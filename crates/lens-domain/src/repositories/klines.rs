use crate::repositories::fetcher::{FetchErrorKind, FetchRequest};
use crate::value_objects::candle::Candle;
use crate::value_objects::contract::ContractInfo;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("unknown contract symbol {0}")]
    UnknownSymbol(String),
    #[error("malformed kline payload: {0}")]
    Malformed(String),
}

/// Exchange-specific kline endpoint. Each exchange gets one implementation;
/// everything downstream only sees [`Candle`]s.
pub trait KlineAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Conventional perpetual symbol for a ticker, used when the contract
    /// listing is unavailable or does not know the ticker.
    fn contract_symbol(&self, ticker: &str) -> String;

    /// Upper bound on one-minute candles returned by a single request.
    fn max_candles_per_request(&self) -> usize;

    /// Request for candles with `start <= open_time <= end` (epoch seconds).
    fn request(&self, symbol: &str, start: i64, end: i64) -> FetchRequest;

    fn parse(&self, symbol: &str, payload: &[u8]) -> Result<Vec<Candle>, AdapterError>;

    /// Error an exchange reports inside a 2xx body (throttling, outages), so
    /// the fetcher can retry it instead of caching it as a success. Bodies
    /// that are a definitive answer, such as an unknown contract, stay `None`.
    fn classify(&self, _payload: &[u8]) -> Option<FetchErrorKind> {
        None
    }

    /// Request for the exchange's futures contract listing, if it has one.
    fn contracts_request(&self) -> Option<FetchRequest> {
        None
    }

    fn parse_contracts(&self, _payload: &[u8]) -> Result<Vec<ContractInfo>, AdapterError> {
        Ok(Vec::new())
    }
}
