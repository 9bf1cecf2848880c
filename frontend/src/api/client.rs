use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::{api::types::ApiError, config::RuntimeConfig};

const BROKER_STATUS_PATH: &str = "/modules/auth/broker/status";

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    pub fn new() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new_with_base_url(config.api_base_url())
    }

    pub fn new_with_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
        }
    }

    /// Bearer token for the application backend (not the broker token).
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Raw status body for `config_id`, shape left to the session normalizer.
    pub async fn fetch_broker_status(&self, config_id: &str) -> Result<Value, ApiError> {
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, BROKER_STATUS_PATH))
            .query(&[("config_id", config_id)]);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::request_failed(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let body: Value = response
                .json()
                .await
                .map_err(|e| ApiError::unknown(format!("Failed to parse response: {}", e)))?;
            if !body.is_object() {
                return Err(ApiError::validation("Broker status response is not an object"));
            }
            return Ok(body);
        }

        let parsed: Option<ApiError> = response.json().await.ok();
        if status == StatusCode::UNAUTHORIZED {
            let message = parsed
                .map(|e| e.error)
                .unwrap_or_else(|| "Broker session expired".to_string());
            return Err(ApiError::unauthorized(message));
        }
        Err(parsed.unwrap_or_else(|| {
            ApiError::request_failed(format!("Broker status request failed with HTTP {}", status))
        }))
    }
}
