use std::{env, time::Duration};

use map::MapOptions;
use vehicle_api::{ApiConfig, ConfigError};

use crate::TrackerError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_CONTAINER: &str = "vehicle-map";

pub const ENV_POLL_INTERVAL_MS: &str = "POLL_INTERVAL_MS";
pub const ENV_CONTAINER: &str = "MAP_CONTAINER";

#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    /// Name of the element the map is mounted into.
    pub container: String,
    pub poll_interval: Duration,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER.to_owned(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ViewConfig {
    pub fn from_env() -> Result<Self, TrackerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, TrackerError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(container) = lookup(ENV_CONTAINER).filter(|name| !name.is_empty()) {
            config.container = container;
        }
        if let Some(interval) = lookup(ENV_POLL_INTERVAL_MS) {
            let millis = interval
                .parse::<u64>()
                .ok()
                .filter(|millis| *millis > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: ENV_POLL_INTERVAL_MS,
                    value: interval,
                })?;
            config.poll_interval = Duration::from_millis(millis);
        }
        Ok(config)
    }
}

/// Everything the `vehicle-map` binary needs, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub api: ApiConfig,
    pub map: MapOptions,
    pub view: ViewConfig,
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self, TrackerError> {
        Ok(Self {
            api: ApiConfig::from_env()?,
            map: MapOptions::from_env(),
            view: ViewConfig::from_env()?,
        })
    }
}
