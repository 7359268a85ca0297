pub mod fcm;
pub mod mock;

use crate::models::PushMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fcm::{FcmConfig, FcmProvider};
pub use mock::MockPushProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not enabled: {0}")]
    NotEnabled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub provider_id: Option<String>,
    pub success: bool,
    pub message: Option<String>,
}

impl ProviderResponse {
    pub fn success(provider_id: Option<String>) -> Self {
        Self {
            provider_id,
            success: true,
            message: None,
        }
    }
}

/// Push delivery backend: "deliver notification given a token and
/// payload".
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, push: &PushMessage) -> Result<ProviderResponse, ProviderError>;

    fn is_enabled(&self) -> bool;
}
