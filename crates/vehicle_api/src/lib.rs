use std::sync::Arc;

use async_trait::async_trait;
use model::RawVehicleRecord;

pub mod client;
pub mod config;

pub use client::VehicleApiClient;
pub use config::ApiConfig;

/// Failure of a single vehicle fetch. None of these are retried by the client.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// DNS, refused connection, timeout or a body that could not be read.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("unexpected response ({status}) from {url}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("malformed vehicle list: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidValue { name: &'static str, value: String },
    #[error("could not build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Something that can be asked for the current list of vehicles.
#[async_trait]
pub trait VehicleSource: Send + Sync + 'static {
    async fn fetch_vehicles(&self) -> Result<Vec<RawVehicleRecord>, FetchError>;
}

#[async_trait]
impl<T: VehicleSource> VehicleSource for Arc<T> {
    async fn fetch_vehicles(&self) -> Result<Vec<RawVehicleRecord>, FetchError> {
        self.as_ref().fetch_vehicles().await
    }
}
