use async_trait::async_trait;
use model::RawVehicleRecord;

use crate::{config::ApiConfig, ConfigError, FetchError, VehicleSource};

/// HTTP client for the `/vehicles` endpoint.
#[derive(Debug, Clone)]
pub struct VehicleApiClient {
    http: reqwest::Client,
    url: String,
}

impl VehicleApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            url: config.vehicles_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs exactly one GET request. Retrying is up to the caller.
    pub async fn fetch_vehicles(&self) -> Result<Vec<RawVehicleRecord>, FetchError> {
        log::debug!("fetching vehicles from {}", self.url);

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status,
                url: self.url.clone(),
            });
        }

        // failing to read the body is a transport failure, not a decode failure
        let body = response.bytes().await.map_err(FetchError::Network)?;
        let vehicles: Vec<RawVehicleRecord> = serde_json::from_slice(&body)?;
        log::debug!("received {} vehicle records", vehicles.len());
        Ok(vehicles)
    }
}

#[async_trait]
impl VehicleSource for VehicleApiClient {
    async fn fetch_vehicles(&self) -> Result<Vec<RawVehicleRecord>, FetchError> {
        VehicleApiClient::fetch_vehicles(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, time::Duration};

    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(status: StatusCode, body: &'static str) -> SocketAddr {
        let routes = Router::new().route("/vehicles", get(move || async move { (status, body) }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, routes.into_make_service()).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr) -> VehicleApiClient {
        let config = ApiConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..Default::default()
        };
        VehicleApiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn decodes_vehicle_list() {
        let addr = serve(
            StatusCode::OK,
            r#"[
                {"vehicle_id": "A", "label": "550", "lat": 60.1, "lon": 24.9, "speed": 10},
                {"vehicle_id": "B", "label": "20", "lat": null, "lon": 24.9, "speed": 5}
            ]"#,
        )
        .await;

        let vehicles = client_for(addr).fetch_vehicles().await.unwrap();
        assert_eq!(vehicles.len(), 2);
        assert_eq!(vehicles[0].id, "A".into());
        assert_eq!(vehicles[0].speed, Some(10.0));
        assert_eq!(vehicles[1].lat, None);
    }

    #[tokio::test]
    async fn vehicle_without_label_keeps_the_rest_of_the_list() {
        let addr = serve(
            StatusCode::OK,
            r#"[
                {"vehicle_id": "A", "label": null, "lat": 60.1, "lon": 24.9, "speed": 10},
                {"vehicle_id": "B", "label": "550", "lat": 60.2, "lon": 25.0, "speed": 5}
            ]"#,
        )
        .await;

        let vehicles = client_for(addr).fetch_vehicles().await.unwrap();
        assert_eq!(vehicles.len(), 2);
        assert_eq!(vehicles[0].label, None);
        assert_eq!(vehicles[1].label.as_deref(), Some("550"));
    }

    #[tokio::test]
    async fn empty_array_is_not_an_error() {
        let addr = serve(StatusCode::OK, "[]").await;
        assert!(client_for(addr).fetch_vehicles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let addr = serve(StatusCode::SERVICE_UNAVAILABLE, "database down").await;
        let error = client_for(addr).fetch_vehicles().await.unwrap_err();
        assert!(matches!(error, FetchError::Http { .. }), "{error:?}");
        assert_eq!(error.status(), Some(reqwest::StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let addr = serve(StatusCode::OK, "[{\"vehicle_id\": ").await;
        let error = client_for(addr).fetch_vehicles().await.unwrap_err();
        assert!(matches!(error, FetchError::Decode(_)), "{error:?}");
    }

    #[tokio::test]
    async fn object_instead_of_array_is_decode_error() {
        let addr = serve(StatusCode::OK, r#"{"vehicles": []}"#).await;
        let error = client_for(addr).fetch_vehicles().await.unwrap_err();
        assert!(matches!(error, FetchError::Decode(_)), "{error:?}");
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let error = client_for(addr).fetch_vehicles().await.unwrap_err();
        assert!(matches!(error, FetchError::Network(_)), "{error:?}");
    }

    #[tokio::test]
    async fn hanging_backend_times_out_as_network_error() {
        let routes = Router::new().route(
            "/vehicles",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "[]"
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, routes.into_make_service()).await.unwrap();
        });

        let config = ApiConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            request_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let error = VehicleApiClient::new(&config)
            .unwrap()
            .fetch_vehicles()
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::Network(_)), "{error:?}");
    }

    #[tokio::test]
    async fn requests_the_vehicles_path_of_the_override() {
        let addr = serve(StatusCode::OK, "[]").await;
        let config = ApiConfig::with_base_url(format!("http://{addr}/"));
        let client = VehicleApiClient::new(&config).unwrap();
        assert_eq!(client.url(), format!("http://{addr}/vehicles"));
        assert!(client.fetch_vehicles().await.is_ok());
    }
}
