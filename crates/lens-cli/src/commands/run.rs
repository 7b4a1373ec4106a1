use lens_application::pipeline::DatasetPipeline;
use lens_infrastructure::reporting::read_announcements_csv;
use std::path::PathBuf;

pub(super) fn run_dataset(config_path: PathBuf, metrics_addr: Option<String>) -> Result<(), String> {
    let (config, settings) = super::common::load_settings(&config_path)?;
    crate::obs::init_metrics(metrics_addr.as_deref())?;

    let paths = crate::infra::resolve_paths(&config, &config_path);
    super::common::print_config_summary("run", &config, &settings, &paths);
    let overall_start = std::time::Instant::now();

    let announcements = read_announcements_csv(&paths.announcements_csv)?;
    let cache = crate::infra::open_cache(&paths.cache_db)?;
    let builder = crate::infra::build_series_builder(&config, cache)?;
    let mut sink = crate::infra::create_sink(&paths, &settings.horizons)?;

    let pipeline = DatasetPipeline::new(builder, settings);
    let summary = pipeline
        .run(&announcements, &mut sink)
        .map_err(|err| err.to_string())?;

    let report = serde_json::to_string_pretty(&summary.to_json())
        .map_err(|err| format!("failed to render run summary: {err}"))?;
    println!("{report}");
    println!("run output: {}", paths.out_csv.display());
    println!(
        "{} cli: run total_ms={}",
        super::common::engine_name(),
        overall_start.elapsed().as_millis()
    );
    Ok(())
}
