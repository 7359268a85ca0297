//! Mock push provider for tests.

use super::{ProviderError, ProviderResponse, PushProvider};
use crate::models::PushMessage;
use async_trait::async_trait;
use std::sync::Mutex;

/// Records every message it is asked to deliver.
pub struct MockPushProvider {
    enabled: bool,
    sent: Mutex<Vec<PushMessage>>,
}

impl MockPushProvider {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl PushProvider for MockPushProvider {
    async fn send(&self, push: &PushMessage) -> Result<ProviderResponse, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::NotEnabled(
                "mock push provider is not enabled".to_string(),
            ));
        }
        self.sent.lock().unwrap().push(push.clone());
        Ok(ProviderResponse::success(Some(format!(
            "mock-{}",
            self.send_count()
        ))))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
