//! Document-to-push forwarding.

use crate::models::{NotificationDocument, PushMessage, TYPE_CHAT_MESSAGE};
use crate::providers::{ProviderError, ProviderResponse, PushProvider};
use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves a user's device token when the notification document does
/// not carry one.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn device_token(&self, user_id: &str) -> Option<String>;
}

/// Static token mapping, for tests and single-process setups.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: HashMap<String, String>,
}

impl InMemoryTokenStore {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn device_token(&self, user_id: &str) -> Option<String> {
        self.tokens.get(user_id).cloned()
    }
}

/// Builds the push message for a notification document. Chat messages
/// carry the chat id in the data payload; every other type carries the
/// reservation id.
pub fn push_message_for(doc: &NotificationDocument, device_token: String) -> PushMessage {
    let mut data = HashMap::new();
    data.insert("type".to_string(), doc.notification_type.clone());

    if doc.notification_type == TYPE_CHAT_MESSAGE {
        data.insert(
            "chatId".to_string(),
            doc.chat_id.clone().unwrap_or_default(),
        );
    } else {
        data.insert(
            "reservationId".to_string(),
            doc.reservation_id.clone().unwrap_or_default(),
        );
    }

    PushMessage {
        device_token,
        title: doc.title.clone(),
        body: doc.message.clone(),
        data,
    }
}

/// Forwards created notification documents to a push provider.
pub struct Forwarder<P, S> {
    provider: P,
    tokens: S,
}

impl<P: PushProvider, S: TokenStore> Forwarder<P, S> {
    pub fn new(provider: P, tokens: S) -> Self {
        Self { provider, tokens }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Deliver the push message for a created document.
    ///
    /// A user without a device token is not an error: the document is
    /// skipped and `Ok(None)` returned, matching the trigger's
    /// behavior. Provider failures propagate.
    pub async fn forward(
        &self,
        doc: &NotificationDocument,
    ) -> Result<Option<ProviderResponse>, ProviderError> {
        let token = match &doc.token {
            Some(token) => Some(token.clone()),
            None => self.tokens.device_token(&doc.user_id).await,
        };

        let Some(token) = token else {
            tracing::info!(user_id = %doc.user_id, "No device token found, skipping");
            return Ok(None);
        };

        let message = push_message_for(doc, token);
        let response = self.provider.send(&message).await?;
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockPushProvider;

    fn chat_doc(user: &str) -> NotificationDocument {
        NotificationDocument {
            user_id: user.to_string(),
            token: None,
            title: "New message".to_string(),
            message: "hello".to_string(),
            notification_type: "chat_message".to_string(),
            chat_id: Some("chat_42".to_string()),
            reservation_id: None,
        }
    }

    fn reservation_doc(user: &str) -> NotificationDocument {
        NotificationDocument {
            user_id: user.to_string(),
            token: None,
            title: "Reservation confirmed".to_string(),
            message: "see you at 6".to_string(),
            notification_type: "reservation_update".to_string(),
            chat_id: None,
            reservation_id: Some("resv_7".to_string()),
        }
    }

    fn store_with(user: &str, token: &str) -> InMemoryTokenStore {
        let mut tokens = HashMap::new();
        tokens.insert(user.to_string(), token.to_string());
        InMemoryTokenStore::new(tokens)
    }

    #[tokio::test]
    async fn chat_message_carries_chat_id() {
        let forwarder = Forwarder::new(MockPushProvider::new(true), store_with("u1", "tok_1"));

        let response = forwarder.forward(&chat_doc("u1")).await.unwrap();
        assert!(response.is_some());

        let sent = forwarder.provider().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].device_token, "tok_1");
        assert_eq!(sent[0].data["type"], "chat_message");
        assert_eq!(sent[0].data["chatId"], "chat_42");
        assert!(!sent[0].data.contains_key("reservationId"));
    }

    #[tokio::test]
    async fn other_types_carry_reservation_id() {
        let forwarder = Forwarder::new(MockPushProvider::new(true), store_with("u1", "tok_1"));

        forwarder.forward(&reservation_doc("u1")).await.unwrap();

        let sent = forwarder.provider().sent();
        assert_eq!(sent[0].data["reservationId"], "resv_7");
        assert!(!sent[0].data.contains_key("chatId"));
    }

    #[tokio::test]
    async fn document_token_wins_over_store() {
        let mut doc = chat_doc("u1");
        doc.token = Some("tok_direct".to_string());
        let forwarder = Forwarder::new(MockPushProvider::new(true), store_with("u1", "tok_store"));

        forwarder.forward(&doc).await.unwrap();

        assert_eq!(forwarder.provider().sent()[0].device_token, "tok_direct");
    }

    #[tokio::test]
    async fn missing_token_skips_delivery() {
        let forwarder =
            Forwarder::new(MockPushProvider::new(true), InMemoryTokenStore::default());

        let response = forwarder.forward(&chat_doc("nobody")).await.unwrap();

        assert!(response.is_none());
        assert_eq!(forwarder.provider().send_count(), 0);
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let forwarder = Forwarder::new(MockPushProvider::new(false), store_with("u1", "tok_1"));

        let err = forwarder.forward(&chat_doc("u1")).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotEnabled(_)));
    }
}
