//! notification-forwarder: push-notification forwarding.
//!
//! Mirrors the document-store trigger interface: given a created
//! notification document, resolve the target device token and deliver
//! a push message. The document-store trigger wiring itself lives
//! outside this crate; callers hand documents in.

pub mod forwarder;
pub mod models;
pub mod providers;

pub use forwarder::{Forwarder, InMemoryTokenStore, TokenStore};
pub use models::{NotificationDocument, PushMessage};
pub use providers::{FcmProvider, MockPushProvider, ProviderError, ProviderResponse, PushProvider};
