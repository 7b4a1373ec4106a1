pub mod kucoin;
pub mod mexc;

pub use kucoin::KucoinFuturesAdapter;
pub use mexc::MexcContractAdapter;

use lens_domain::repositories::klines::KlineAdapter;
use serde_json::Value;
use std::sync::Arc;

/// Epoch values below this are seconds, anything larger milliseconds.
const SECONDS_CUTOFF: i64 = 10_000_000_000;

pub const SUPPORTED_EXCHANGES: &[&str] = &["mexc", "kucoin"];

/// Adapter for a configured exchange name, optionally overriding its base URL.
pub fn adapter_for(exchange: &str, base_url: Option<&str>) -> Result<Arc<dyn KlineAdapter>, String> {
    match exchange.trim().to_lowercase().as_str() {
        "mexc" => Ok(Arc::new(match base_url {
            Some(url) => MexcContractAdapter::with_base_url(url),
            None => MexcContractAdapter::default(),
        })),
        "kucoin" => Ok(Arc::new(match base_url {
            Some(url) => KucoinFuturesAdapter::with_base_url(url),
            None => KucoinFuturesAdapter::default(),
        })),
        other => Err(format!(
            "unsupported exchange: {other} (expected one of {})",
            SUPPORTED_EXCHANGES.join(", ")
        )),
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub(crate) fn epoch_seconds(value: &Value) -> Option<i64> {
    let raw = integer(value)?;
    if raw < 0 {
        return None;
    }
    Some(if raw < SECONDS_CUTOFF { raw } else { raw / 1000 })
}

pub(crate) fn price(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Contract objects from a listing's `data`, which is either the array itself
/// or an object wrapping it under `list`/`items`.
pub(crate) fn contract_rows(data: Option<&Value>) -> impl Iterator<Item = &serde_json::Map<String, Value>> {
    let rows = match data {
        Some(Value::Array(rows)) => Some(rows),
        Some(Value::Object(wrapper)) => ["list", "items"]
            .iter()
            .find_map(|key| wrapper.get(*key).and_then(Value::as_array)),
        _ => None,
    };
    rows.into_iter().flatten().filter_map(Value::as_object)
}

/// First of `keys` holding a string, or `""`.
pub(crate) fn text_field<'a>(item: &'a serde_json::Map<String, Value>, keys: &[&str]) -> &'a str {
    keys.iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
}

pub(crate) fn offline(status: Option<&Value>) -> bool {
    status.and_then(Value::as_str).is_some_and(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "offline" | "disabled" | "suspend" | "closed" | "paused"
        )
    })
}

pub(crate) fn mentions_missing_contract(message: &str) -> bool {
    message.to_lowercase().contains("not exist")
}

#[cfg(test)]
mod tests {
    use super::{adapter_for, epoch_seconds, price};
    use serde_json::json;

    #[test]
    fn epoch_unit_is_inferred() {
        assert_eq!(epoch_seconds(&json!(1_700_000_040)), Some(1_700_000_040));
        assert_eq!(epoch_seconds(&json!(1_700_000_040_000i64)), Some(1_700_000_040));
        assert_eq!(epoch_seconds(&json!("1700000040000")), Some(1_700_000_040));
        assert_eq!(epoch_seconds(&json!(null)), None);
    }

    #[test]
    fn prices_accept_strings_and_reject_garbage() {
        assert_eq!(price(&json!("0.0123")), Some(0.0123));
        assert_eq!(price(&json!(2.5)), Some(2.5));
        assert_eq!(price(&json!("abc")), None);
    }

    #[test]
    fn factory_knows_supported_exchanges() {
        assert_eq!(adapter_for("MEXC", None).unwrap().name(), "mexc");
        assert_eq!(
            adapter_for("kucoin", Some("http://localhost:9")).unwrap().name(),
            "kucoin"
        );
        assert!(adapter_for("gate", None).is_err());
    }
}
