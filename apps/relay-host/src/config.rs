use anyhow::Result;
use clap::Parser;
use relay_bus::BusConfig;

#[derive(Parser, Debug, Clone, Default)]
#[command(
    author,
    version,
    about = "Relay bus host: JSON envelopes in on stdin, events out on stdout"
)]
pub struct HostArgs {
    /// Do not seed the `core` provider
    #[arg(long)]
    pub no_core: bool,
    /// Prefix for channel identifiers (overrides RELAY_CHANNEL_PREFIX)
    #[arg(long)]
    pub channel_prefix: Option<String>,
    /// Maximum number of open channels, 0 for no limit (overrides RELAY_MAX_CHANNELS)
    #[arg(long)]
    pub max_channels: Option<usize>,
    /// Emit logs as JSON on stderr
    #[arg(long, env = "RELAY_JSON_LOGS")]
    pub json_logs: bool,
}

impl HostArgs {
    /// Bus settings from the environment with command-line overrides applied.
    pub fn bus_config(&self) -> Result<BusConfig> {
        self.apply(BusConfig::from_env()?)
    }

    pub(crate) fn apply(&self, mut config: BusConfig) -> Result<BusConfig> {
        if self.no_core {
            config.seed_core = false;
        }
        if let Some(prefix) = self.channel_prefix.as_deref() {
            anyhow::ensure!(
                !prefix.trim().is_empty(),
                "--channel-prefix must not be blank"
            );
            config.channel_prefix = prefix.to_owned();
        }
        if let Some(max) = self.max_channels {
            config.max_channels = (max > 0).then_some(max);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_environment() {
        let args = HostArgs::parse_from([
            "relay-host",
            "--no-core",
            "--channel-prefix",
            "ch",
            "--max-channels",
            "4",
        ]);
        let config = args.apply(BusConfig::default()).unwrap();
        assert!(!config.seed_core);
        assert_eq!(config.channel_prefix, "ch");
        assert_eq!(config.max_channels, Some(4));
    }

    #[test]
    fn absent_flags_keep_base_values() {
        let base = BusConfig {
            max_channels: Some(2),
            channel_prefix: "env-".into(),
            ..BusConfig::default()
        };
        let config = HostArgs::parse_from(["relay-host"])
            .apply(base.clone())
            .unwrap();
        assert_eq!(config, base);
    }

    #[test]
    fn zero_max_channels_lifts_limit() {
        let base = BusConfig {
            max_channels: Some(2),
            ..BusConfig::default()
        };
        let args = HostArgs::parse_from(["relay-host", "--max-channels", "0"]);
        assert_eq!(args.apply(base).unwrap().max_channels, None);
    }

    #[test]
    fn blank_prefix_is_rejected() {
        let args = HostArgs::parse_from(["relay-host", "--channel-prefix", " "]);
        assert!(args.apply(BusConfig::default()).is_err());
    }
}
