use crate::exchanges::{contract_rows, epoch_seconds, mentions_missing_contract, offline, price, text_field};
use lens_domain::repositories::fetcher::{FetchErrorKind, FetchRequest};
use lens_domain::repositories::klines::{AdapterError, KlineAdapter};
use lens_domain::value_objects::candle::Candle;
use lens_domain::value_objects::contract::ContractInfo;
use serde::Deserialize;
use serde_json::Value;

pub const MEXC_CONTRACT_BASE_URL: &str = "https://contract.mexc.com";
const MAX_CANDLES: usize = 2000;
const CONTRACT_NOT_FOUND: i64 = 1001;
const TOO_FREQUENT: i64 = 510;

/// MEXC perpetual contract klines (`/api/v1/contract/kline/{symbol}`).
#[derive(Debug, Clone)]
pub struct MexcContractAdapter {
    base_url: String,
}

impl Default for MexcContractAdapter {
    fn default() -> Self {
        Self::with_base_url(MEXC_CONTRACT_BASE_URL)
    }
}

impl MexcContractAdapter {
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

fn envelope(payload: &[u8]) -> Result<Envelope, AdapterError> {
    serde_json::from_slice(payload).map_err(|err| AdapterError::Malformed(format!("mexc body: {err}")))
}

fn code_of(envelope: &Envelope) -> Option<i64> {
    envelope.code.as_ref().and_then(|code| match code {
        Value::String(s) => s.trim().parse().ok(),
        other => other.as_i64(),
    })
}

impl KlineAdapter for MexcContractAdapter {
    fn name(&self) -> &str {
        "mexc"
    }

    fn contract_symbol(&self, ticker: &str) -> String {
        format!("{}_USDT", ticker.trim().to_uppercase())
    }

    fn max_candles_per_request(&self) -> usize {
        MAX_CANDLES
    }

    fn request(&self, symbol: &str, start: i64, end: i64) -> FetchRequest {
        FetchRequest::new(format!("{}/api/v1/contract/kline/{}", self.base_url, symbol))
            .param("interval", "Min1")
            .param("start", start)
            .param("end", end)
    }

    fn parse(&self, symbol: &str, payload: &[u8]) -> Result<Vec<Candle>, AdapterError> {
        let envelope = envelope(payload)?;

        if envelope.success == Some(false) {
            let code = code_of(&envelope);
            let message = envelope.message.unwrap_or_default();
            if code == Some(CONTRACT_NOT_FOUND) || mentions_missing_contract(&message) {
                return Err(AdapterError::UnknownSymbol(symbol.to_string()));
            }
            return Err(AdapterError::Malformed(format!(
                "mexc rejected kline request for {symbol} (code {}): {message}",
                code.map_or_else(|| "?".to_string(), |c| c.to_string())
            )));
        }

        let mut candles = match envelope.data {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(columns)) => parse_columns(&columns)?,
            Some(Value::Array(rows)) => rows.iter().filter_map(parse_row).collect(),
            Some(other) => {
                return Err(AdapterError::Malformed(format!(
                    "unexpected mexc data shape: {other}"
                )))
            }
        };
        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }

    fn classify(&self, payload: &[u8]) -> Option<FetchErrorKind> {
        let envelope = envelope(payload).ok()?;
        (envelope.success == Some(false) && code_of(&envelope) == Some(TOO_FREQUENT))
            .then_some(FetchErrorKind::RateLimited)
    }

    fn contracts_request(&self) -> Option<FetchRequest> {
        Some(FetchRequest::new(format!("{}/api/v1/contract/detail", self.base_url)))
    }

    fn parse_contracts(&self, payload: &[u8]) -> Result<Vec<ContractInfo>, AdapterError> {
        let envelope = envelope(payload)?;
        if envelope.success == Some(false) {
            return Err(AdapterError::Malformed(format!(
                "mexc rejected contract listing: {}",
                envelope.message.unwrap_or_default()
            )));
        }
        Ok(contract_rows(envelope.data.as_ref())
            .filter_map(|item| {
                let symbol = text_field(item, &["symbol", "contractCode"]);
                let base = text_field(item, &["baseCoin", "base"]);
                if symbol.is_empty() || base.is_empty() || offline(item.get("status")) {
                    return None;
                }
                Some(ContractInfo::new(
                    symbol,
                    base,
                    text_field(item, &["quoteCoin", "quote"]),
                    text_field(item, &["contractType", "type"]),
                ))
            })
            .collect())
    }
}

fn column<'a>(columns: &'a serde_json::Map<String, Value>, name: &str) -> Result<&'a [Value], AdapterError> {
    match columns.get(name) {
        Some(Value::Array(values)) => Ok(values.as_slice()),
        None | Some(Value::Null) => Ok(&[]),
        Some(_) => Err(AdapterError::Malformed(format!("mexc column {name} is not an array"))),
    }
}

fn parse_columns(columns: &serde_json::Map<String, Value>) -> Result<Vec<Candle>, AdapterError> {
    let times = column(columns, "time")?;
    let closes = column(columns, "close")?;

    let candles: Vec<Candle> = times
        .iter()
        .zip(closes.iter())
        .filter_map(|(time, close)| Some(Candle::new(epoch_seconds(time)?, price(close)?)))
        .collect();
    if candles.len() < times.len() {
        tracing::debug!(
            times = times.len(),
            closes = closes.len(),
            kept = candles.len(),
            "dropped unparseable mexc kline columns"
        );
    }
    Ok(candles)
}

/// Row layout `[time, open, high, low, close, ...]`.
fn parse_row(row: &Value) -> Option<Candle> {
    let fields = row.as_array()?;
    Some(Candle::new(epoch_seconds(fields.first()?)?, price(fields.get(4)?)?))
}
