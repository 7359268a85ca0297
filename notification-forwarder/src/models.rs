use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Notification type for chat messages; everything else is treated as a
/// reservation notification.
pub const TYPE_CHAT_MESSAGE: &str = "chat_message";

/// A created notification document, as handed to the forwarder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDocument {
    pub user_id: String,
    /// Device token, when the producer already knows it. Resolved from
    /// the token store otherwise.
    #[serde(default)]
    pub token: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub reservation_id: Option<String>,
}

/// A push message ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub device_token: String,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}
