use anyhow::{Context, Result};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub bus_id: Uuid,
    pub seed_core: bool,
    pub channel_prefix: String,
    pub max_channels: Option<usize>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bus_id: Uuid::new_v4(),
            seed_core: true,
            channel_prefix: "c".into(),
            max_channels: None,
        }
    }
}

impl BusConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let seed_core = lookup("RELAY_SEED_CORE")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.seed_core);
        let channel_prefix = lookup("RELAY_CHANNEL_PREFIX")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.channel_prefix);
        let max_channels = lookup("RELAY_MAX_CHANNELS")
            .map(|raw| {
                raw.trim()
                    .parse::<usize>()
                    .with_context(|| format!("RELAY_MAX_CHANNELS must be a count, got `{raw}`"))
            })
            .transpose()?
            .filter(|max| *max > 0);

        Ok(Self {
            bus_id: defaults.bus_id,
            seed_core,
            channel_prefix,
            max_channels,
        })
    }
}
