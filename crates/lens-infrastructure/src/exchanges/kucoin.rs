use crate::exchanges::{contract_rows, epoch_seconds, mentions_missing_contract, offline, price, text_field};
use lens_domain::repositories::fetcher::{FetchErrorKind, FetchRequest};
use lens_domain::repositories::klines::{AdapterError, KlineAdapter};
use lens_domain::value_objects::candle::Candle;
use lens_domain::value_objects::contract::ContractInfo;
use serde::Deserialize;
use serde_json::Value;

pub const KUCOIN_FUTURES_BASE_URL: &str = "https://api-futures.kucoin.com";
const MAX_CANDLES: usize = 500;
const OK_CODE: &str = "200000";
const TOO_MANY_REQUESTS: &str = "429000";
/// KuCoin's product type label for perpetual swaps.
const PERPETUAL_TYPE: &str = "FFWCSX";

/// KuCoin futures klines (`/api/v1/kline/query`), rows
/// `[time_ms, open, high, low, close, volume]`.
#[derive(Debug, Clone)]
pub struct KucoinFuturesAdapter {
    base_url: String,
}

impl Default for KucoinFuturesAdapter {
    fn default() -> Self {
        Self::with_base_url(KUCOIN_FUTURES_BASE_URL)
    }
}

impl KucoinFuturesAdapter {
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: Value,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl Envelope {
    fn code(&self) -> String {
        match &self.code {
            Value::String(code) => code.clone(),
            other => other.to_string(),
        }
    }
}

fn envelope(payload: &[u8]) -> Result<Envelope, AdapterError> {
    serde_json::from_slice(payload).map_err(|err| AdapterError::Malformed(format!("kucoin body: {err}")))
}

impl KlineAdapter for KucoinFuturesAdapter {
    fn name(&self) -> &str {
        "kucoin"
    }

    fn contract_symbol(&self, ticker: &str) -> String {
        format!("{}USDTM", ticker.trim().to_uppercase())
    }

    fn max_candles_per_request(&self) -> usize {
        MAX_CANDLES
    }

    fn request(&self, symbol: &str, start: i64, end: i64) -> FetchRequest {
        FetchRequest::new(format!("{}/api/v1/kline/query", self.base_url))
            .param("symbol", symbol)
            .param("granularity", 1)
            .param("from", start * 1000)
            .param("to", end * 1000)
    }

    fn parse(&self, symbol: &str, payload: &[u8]) -> Result<Vec<Candle>, AdapterError> {
        let envelope = envelope(payload)?;

        let code = envelope.code();
        if code != OK_CODE {
            let message = envelope.msg.unwrap_or_default();
            if mentions_missing_contract(&message) {
                return Err(AdapterError::UnknownSymbol(symbol.to_string()));
            }
            return Err(AdapterError::Malformed(format!(
                "kucoin rejected kline request for {symbol} (code {code}): {message}"
            )));
        }

        let rows = match envelope.data {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(rows)) => rows,
            Some(other) => {
                return Err(AdapterError::Malformed(format!(
                    "unexpected kucoin data shape: {other}"
                )))
            }
        };
        let mut candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| {
                let fields = row.as_array()?;
                Some(Candle::new(epoch_seconds(fields.first()?)?, price(fields.get(4)?)?))
            })
            .collect();
        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }

    fn classify(&self, payload: &[u8]) -> Option<FetchErrorKind> {
        let envelope = envelope(payload).ok()?;
        (envelope.code() == TOO_MANY_REQUESTS).then_some(FetchErrorKind::RateLimited)
    }

    fn contracts_request(&self) -> Option<FetchRequest> {
        Some(FetchRequest::new(format!("{}/api/v1/contracts/active", self.base_url)))
    }

    fn parse_contracts(&self, payload: &[u8]) -> Result<Vec<ContractInfo>, AdapterError> {
        let envelope = envelope(payload)?;
        let code = envelope.code();
        if code != OK_CODE {
            return Err(AdapterError::Malformed(format!(
                "kucoin rejected contract listing (code {code}): {}",
                envelope.msg.unwrap_or_default()
            )));
        }
        Ok(contract_rows(envelope.data.as_ref())
            .filter_map(|item| {
                let symbol = text_field(item, &["symbol"]);
                let base = text_field(item, &["baseCurrency"]);
                if symbol.is_empty() || base.is_empty() || offline(item.get("status")) {
                    return None;
                }
                let kind = text_field(item, &["type"]);
                Some(ContractInfo::new(
                    symbol,
                    base,
                    text_field(item, &["quoteCurrency"]),
                    if kind == PERPETUAL_TYPE { "perpetual" } else { kind },
                ))
            })
            .collect())
    }
}
