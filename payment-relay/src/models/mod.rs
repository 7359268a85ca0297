use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Active, confirmed payment awaiting possible cancellation.
///
/// One row per payment key; the row is deleted (and a [`Cancellation`]
/// written) when the gateway reports the payment canceled.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub payment_key: String,
    pub order_id: String,
    pub order_name: String,
    /// Currency minor units (e.g. KRW has none, so this is the full amount).
    pub total_amount: i64,
    pub requested_at: DateTime<Utc>,
    pub approved_at: DateTime<Utc>,
    pub buyer: String,
}

/// Terminal record of a successfully canceled payment.
///
/// Written only inside the cancel transaction, together with the
/// deletion of the matching [`Payment`] row. Never updated or deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Cancellation {
    pub payment_key: String,
    pub order_id: String,
    pub order_name: String,
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub approved_at: DateTime<Utc>,
    pub cancel_reason: String,
    pub cancel_amount: i64,
    pub buyer: String,
}

/// Purchase history row returned by the list endpoint.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PurchaseRow {
    pub order_name: String,
    pub total_amount: i64,
    pub approved_at: DateTime<Utc>,
}
