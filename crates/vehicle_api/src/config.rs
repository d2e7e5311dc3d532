use std::{env, time::Duration};

use crate::ConfigError;

/// Port the vehicle backend listens on when only a host is known.
pub const DEFAULT_PORT: u16 = 8007;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENV_BASE_URL: &str = "VEHICLE_API_URL";
pub const ENV_HOST: &str = "VEHICLE_API_HOST";
pub const ENV_PORT: &str = "VEHICLE_API_PORT";
pub const ENV_TIMEOUT_MS: &str = "VEHICLE_API_TIMEOUT_MS";

/// Where to find the vehicle backend. Either `host` and `port` are combined,
/// or `base_url_override` is used as is.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub base_url_override: Option<String>,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            base_url_override: None,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ApiConfig {
    pub fn with_host<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url_override: Some(base_url.into()),
            ..Default::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();
        // an empty override counts as unset, there is no page origin to resolve against
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|url| !url.is_empty()) {
            config.base_url_override = Some(base_url);
        }
        if let Some(host) = lookup(ENV_HOST).filter(|host| !host.is_empty()) {
            config.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            config.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_PORT,
                value: port,
            })?;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_MS) {
            let millis: u64 = timeout.parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_TIMEOUT_MS,
                value: timeout,
            })?;
            config.request_timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }

    pub fn base_url(&self) -> String {
        match &self.base_url_override {
            Some(base_url) => base_url.trim_end_matches('/').to_owned(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn vehicles_url(&self) -> String {
        format!("{}/vehicles", self.base_url())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(
        vars: &[(&'static str, &str)],
    ) -> impl Fn(&'static str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(name, value)| (*name, value.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_local_backend_port() {
        let config = ApiConfig::default();
        assert_eq!(config.vehicles_url(), "http://localhost:8007/vehicles");
    }

    #[test]
    fn host_is_combined_with_fixed_port() {
        let config = ApiConfig::with_host("buses.example.org");
        assert_eq!(config.base_url(), "http://buses.example.org:8007");
    }

    #[test]
    fn override_wins_and_trailing_slash_is_trimmed() {
        let config = ApiConfig {
            host: "ignored".to_owned(),
            ..ApiConfig::with_base_url("https://example.org/api/")
        };
        assert_eq!(config.vehicles_url(), "https://example.org/api/vehicles");
    }

    #[test]
    fn reads_host_and_port_from_environment() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            (ENV_HOST, "10.0.0.5"),
            (ENV_PORT, "9000"),
            (ENV_TIMEOUT_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.base_url(), "http://10.0.0.5:9000");
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn reads_base_url_from_environment() {
        let config =
            ApiConfig::from_lookup(lookup_from(&[(ENV_BASE_URL, "http://proxy/api")]))
                .unwrap();
        assert_eq!(config.vehicles_url(), "http://proxy/api/vehicles");
    }

    #[test]
    fn empty_base_url_falls_back_to_host() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            (ENV_BASE_URL, ""),
            (ENV_HOST, "buses.local"),
        ]))
        .unwrap();
        assert_eq!(config.base_url_override, None);
        assert_eq!(config.base_url(), "http://buses.local:8007");
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ApiConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ApiConfig::default());
    }

    #[test]
    fn rejects_malformed_port() {
        let result = ApiConfig::from_lookup(lookup_from(&[(ENV_PORT, "eighty")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name: ENV_PORT, .. })
        ));
    }
}
