//! FCM push provider (HTTP v1 API).

use super::{ProviderError, ProviderResponse, PushProvider};
use crate::models::PushMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const FCM_API_URL: &str = "https://fcm.googleapis.com/v1/projects";

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub enabled: bool,
    pub project_id: String,
    pub service_account_key: String,
    /// Overridable for tests; defaults to the live endpoint.
    pub api_base_url: String,
}

impl FcmConfig {
    pub fn new(enabled: bool, project_id: String, service_account_key: String) -> Self {
        Self {
            enabled,
            project_id,
            service_account_key,
            api_base_url: FCM_API_URL.to_string(),
        }
    }
}

pub struct FcmProvider {
    config: FcmConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct FcmRequest {
    message: FcmMessage,
}

#[derive(Debug, Serialize)]
struct FcmMessage {
    token: String,
    notification: FcmNotification,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<HashMap<String, String>>,
    android: FcmAndroidConfig,
    apns: FcmApnsConfig,
}

#[derive(Debug, Serialize)]
struct FcmNotification {
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct FcmAndroidConfig {
    priority: String,
}

#[derive(Debug, Serialize)]
struct FcmApnsConfig {
    payload: FcmApnsPayload,
}

#[derive(Debug, Serialize)]
struct FcmApnsPayload {
    aps: FcmAps,
}

#[derive(Debug, Serialize)]
struct FcmAps {
    sound: String,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    name: Option<String>,
    #[serde(default)]
    error: Option<FcmError>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct FcmError {
    code: i32,
    message: String,
    status: String,
}

impl FcmProvider {
    pub fn new(config: FcmConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    async fn get_access_token(&self) -> Result<String, ProviderError> {
        // A real deployment exchanges the service account key for an
        // OAuth2 token; the key is used directly as a bearer here.
        if self.config.service_account_key.is_empty() {
            return Err(ProviderError::Configuration(
                "FCM service account key not configured".to_string(),
            ));
        }
        Ok(self.config.service_account_key.clone())
    }
}

#[async_trait]
impl PushProvider for FcmProvider {
    async fn send(&self, push: &PushMessage) -> Result<ProviderResponse, ProviderError> {
        if !self.config.enabled {
            return Err(ProviderError::NotEnabled(
                "FCM push provider is not enabled".to_string(),
            ));
        }

        if self.config.project_id.is_empty() {
            return Err(ProviderError::Configuration(
                "FCM project_id is not configured".to_string(),
            ));
        }

        let access_token = self.get_access_token().await?;

        let request = FcmRequest {
            message: FcmMessage {
                token: push.device_token.clone(),
                notification: FcmNotification {
                    title: push.title.clone(),
                    body: push.body.clone(),
                },
                data: (!push.data.is_empty()).then(|| push.data.clone()),
                android: FcmAndroidConfig {
                    priority: "high".to_string(),
                },
                apns: FcmApnsConfig {
                    payload: FcmApnsPayload {
                        aps: FcmAps {
                            sound: "default".to_string(),
                        },
                    },
                },
            },
        };

        let url = format!(
            "{}/{}/messages:send",
            self.config.api_base_url, self.config.project_id
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&access_token)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(format!("Failed to connect to FCM: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::SendFailed(format!(
                "FCM API returned error status {}: {}",
                status, body
            )));
        }

        let fcm_response: FcmResponse = response.json().await.map_err(|e| {
            ProviderError::SendFailed(format!("Failed to parse FCM response: {}", e))
        })?;

        if let Some(error) = fcm_response.error {
            return Err(ProviderError::SendFailed(format!(
                "FCM error ({}): {}",
                error.status, error.message
            )));
        }

        tracing::info!(
            device_token = %push.device_token,
            "Push notification sent via FCM"
        );

        Ok(ProviderResponse::success(fcm_response.name))
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}
