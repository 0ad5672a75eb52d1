use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub json_logs: bool,
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str, default_service_version: &str) -> Self {
        Self::from_lookup(default_service_name, default_service_version, |key| {
            env::var(key).ok()
        })
    }

    pub(crate) fn from_lookup<F>(
        default_service_name: &str,
        default_service_version: &str,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_name =
            lookup("RELAY_SERVICE_NAME").unwrap_or_else(|| default_service_name.to_string());
        let service_version = lookup("RELAY_SERVICE_VERSION")
            .unwrap_or_else(|| default_service_version.to_string());
        let json_logs = lookup("LOG_FORMAT")
            .map(|v| !matches!(v.to_lowercase().as_str(), "text" | "pretty" | "plain"))
            .unwrap_or(false);
        let default_filter = lookup("RELAY_LOG_LEVEL").unwrap_or_else(|| "info".into());

        Self {
            service_name,
            service_version,
            json_logs,
            default_filter,
        }
    }
}
