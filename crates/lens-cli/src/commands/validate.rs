use lens_infrastructure::exchanges::adapter_for;
use lens_infrastructure::reporting::read_announcements_csv;
use std::path::PathBuf;

pub(super) fn run_validate(config_path: PathBuf) -> Result<(), String> {
    let (config, settings) = super::common::load_settings(&config_path)?;
    let paths = crate::infra::resolve_paths(&config, &config_path);
    super::common::print_config_summary("validate-config", &config, &settings, &paths);

    let adapter = adapter_for(&settings.exchange, config.http.base_url.as_deref())?;
    println!(
        "adapter: {} (max_candles_per_request={})",
        adapter.name(),
        adapter.max_candles_per_request()
    );

    if paths.announcements_csv.exists() {
        let announcements = read_announcements_csv(&paths.announcements_csv)?;
        println!("announcements: {} row(s) parsed", announcements.len());
    } else {
        println!(
            "announcements: {} not found (required by `run`)",
            paths.announcements_csv.display()
        );
    }
    println!("config ok");
    Ok(())
}
