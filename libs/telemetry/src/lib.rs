//! Tracing setup shared by relay binaries.

mod config;
mod tracing_init;

use anyhow::Result;

pub use config::TelemetryConfig;
pub use tracing_init::init_telemetry;

/// Installs the shared subscriber configured from `RUST_LOG` and `LOG_FORMAT`.
pub fn install(service_name: &str, service_version: &str) -> Result<()> {
    init_telemetry(&TelemetryConfig::from_env(service_name, service_version))
}

/// Like [`install`], forcing JSON output regardless of `LOG_FORMAT`.
pub fn install_json(service_name: &str, service_version: &str) -> Result<()> {
    let mut cfg = TelemetryConfig::from_env(service_name, service_version);
    cfg.json_logs = true;
    init_telemetry(&cfg)
}
