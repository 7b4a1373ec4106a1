use lens_application::config::LogFormat;
use std::net::SocketAddr;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// `LENS_LOG` wins over the configured level so a single run can be made
/// noisier without editing the config.
pub fn init_tracing(log_level: Option<&str>, log_format: LogFormat) -> Result<(), String> {
    let filter = std::env::var("LENS_LOG")
        .unwrap_or_else(|_| log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| format!("invalid log filter: {err}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let result = match log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    result.map_err(|err| format!("failed to init tracing: {err}"))
}

#[cfg(feature = "prometheus")]
pub fn init_metrics(metrics_addr: Option<&str>) -> Result<Option<SocketAddr>, String> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let Some(raw) = metrics_addr else {
        return Ok(None);
    };
    let addr: SocketAddr = raw
        .parse()
        .map_err(|err| format!("invalid --metrics-addr (expected host:port): {err}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|err| format!("failed to install prometheus exporter: {err}"))?;

    tracing::info!(metrics_addr = %addr, "prometheus metrics exporter enabled");
    Ok(Some(addr))
}

#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(metrics_addr: Option<&str>) -> Result<Option<SocketAddr>, String> {
    if metrics_addr.is_some() {
        return Err("metrics exporter requires lens-cli feature `prometheus`".to_string());
    }
    Ok(None)
}
