use std::time::Duration;

use reqwest::blocking::Client;

use crate::registry::domain::alert_sink::{Alert, AlertSink};
use crate::registry::domain::camera_source::CameraSource;
use crate::registry::domain::registry_error::RegistryError;
use crate::shared::camera::Camera;

/// Blocking JSON client for the registry's `/cameras` and `/alerts` routes.
///
/// Every request is bounded by the timeout given at construction, so an
/// unreachable registry costs at most one timeout per call.
pub struct HttpRegistryClient {
    base_url: String,
    client: Client,
}

impl HttpRegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RegistryError::Client)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{route}", self.base_url)
    }
}

impl CameraSource for HttpRegistryClient {
    fn fetch_cameras(&self) -> Result<Vec<Camera>, RegistryError> {
        let url = self.url("cameras");
        let transport = |e| RegistryError::Transport {
            url: url.clone(),
            source: e,
        };

        let response = self.client.get(&url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(transport)?;
        serde_json::from_str(&body).map_err(|e| RegistryError::Decode { url, source: e })
    }
}

impl AlertSink for HttpRegistryClient {
    fn send_alert(&self, alert: &Alert) -> Result<(), RegistryError> {
        let url = self.url("alerts");
        let response = self
            .client
            .post(&url)
            .json(alert)
            .send()
            .map_err(|e| RegistryError::Transport {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
