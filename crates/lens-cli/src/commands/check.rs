use lens_application::series::SeriesError;
use lens_application::validation::ListingValidator;
use lens_domain::services::listing::ListingStatus;
use lens_domain::value_objects::candle::floor_to_minute;
use lens_infrastructure::reporting::{format_timestamp, parse_timestamp};
use std::path::PathBuf;

pub(super) fn run_check_listing(config_path: PathBuf, ticker: &str, at: &str) -> Result<(), String> {
    let (config, settings) = super::common::load_settings(&config_path)?;
    let announced_at = floor_to_minute(parse_timestamp(at)?);

    let paths = crate::infra::resolve_paths(&config, &config_path);
    let cache = crate::infra::open_cache(&paths.cache_db)?;
    let builder = crate::infra::build_series_builder(&config, cache)?;
    let candidates = builder
        .contract_candidates(ticker)
        .map_err(|err| format!("contract lookup failed for {ticker}: {err}"))?;

    // First tradable candidate wins; otherwise the first one the exchange knows.
    let validator = ListingValidator::new(builder, settings.listing);
    let mut answer: Option<(&str, ListingStatus)> = None;
    for symbol in &candidates {
        let status = match validator.was_tradable_at(symbol, announced_at) {
            Ok(status) => status,
            Err(SeriesError::SymbolUnknown(_)) => continue,
            Err(err) => return Err(format!("listing check failed for {symbol}: {err}")),
        };
        if answer.is_none() || status == ListingStatus::Tradable {
            answer = Some((symbol, status));
        }
        if status == ListingStatus::Tradable {
            break;
        }
    }
    let (symbol, status) = answer.ok_or_else(|| {
        format!(
            "no contract for {ticker} on {} (tried {})",
            settings.exchange,
            candidates.join(", ")
        )
    })?;

    println!(
        "listing: exchange={} symbol={} at={} status={}",
        settings.exchange,
        symbol,
        format_timestamp(announced_at),
        status.as_str()
    );
    Ok(())
}
