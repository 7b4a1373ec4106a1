use super::CacheAction;
use lens_domain::repositories::cache::ResponseCache;
use lens_domain::value_objects::fingerprint::RequestFingerprint;
use std::path::PathBuf;

pub(super) fn run_cache(config_path: PathBuf, action: CacheAction) -> Result<(), String> {
    let (config, _settings) = super::common::load_settings(&config_path)?;
    let paths = crate::infra::resolve_paths(&config, &config_path);
    let cache = crate::infra::open_cache(&paths.cache_db)?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats().map_err(|err| err.to_string())?;
            println!(
                "cache: path={} entries={} successes={} errors={}",
                paths.cache_db.display(),
                stats.entries,
                stats.successes,
                stats.errors
            );
        }
        CacheAction::Invalidate { fingerprint } => {
            let fingerprint = RequestFingerprint::parse(&fingerprint)?;
            let removed = cache.invalidate(&fingerprint).map_err(|err| err.to_string())?;
            if removed {
                println!("cache: removed {fingerprint}");
            } else {
                println!("cache: no entry for {fingerprint}");
            }
        }
        CacheAction::Clear => {
            let removed = cache.clear().map_err(|err| err.to_string())?;
            println!("cache: cleared {removed} entries");
        }
    }
    Ok(())
}
