//! Reconciliation handlers: confirm, verify, cancel, purchase list.
//!
//! Confirm and verify differ only in which gateway call they make; both
//! converge on [`record_verified_payment`], the single shared
//! verification + persistence routine. Cancel runs as one
//! connection-scoped transaction so the payment row and its
//! cancellation record can never diverge.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::models::{Cancellation, Payment, PurchaseRow};
use crate::services::gateway::{GatewayError, GatewayPayment};
use crate::services::metrics::{
    CANCELLATIONS_TOTAL, ERRORS_TOTAL, GATEWAY_CALL_DURATION, PAYMENTS_RECORDED,
};
use crate::startup::AppState;

/// Gateway status meaning a payment is confirmed and settled.
const STATUS_DONE: &str = "DONE";
/// Gateway status meaning a cancellation went through.
const STATUS_CANCELED: &str = "CANCELED";

// Required fields use `serde(default)` plus a validator check instead of
// serde-level rejection, so a missing field produces the same 400
// validation error as an empty one, before any external call is made.

/// Request to confirm a payment after checkout.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "paymentKey is required"))]
    pub payment_key: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "orderId is required"))]
    pub order_id: String,
    #[serde(default)]
    #[validate(range(min = 1, message = "amount is required"))]
    pub amount: i64,
    #[serde(default)]
    #[validate(length(min = 1, message = "buyer is required"))]
    pub buyer: String,
}

/// Request to verify an already-confirmed payment against the gateway.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "paymentKey is required"))]
    pub payment_key: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "orderId is required"))]
    pub order_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "buyer is required"))]
    pub buyer: String,
}

/// Request to cancel a payment. Callers don't know the payment key;
/// the payment is looked up by (buyer, orderName).
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "buyer is required"))]
    pub buyer: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "orderName is required"))]
    pub order_name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "cancelReason is required"))]
    pub cancel_reason: String,
    #[serde(default)]
    #[validate(range(min = 1, message = "cancelAmount is required"))]
    pub cancel_amount: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PurchaseListQuery {
    #[serde(default)]
    #[validate(length(min = 1, message = "buyer is required"))]
    pub buyer: String,
}

/// Confirm/verify response. `statusCode` is the caller-facing outcome:
/// 0 = verified and recorded, 1 = verification failed,
/// 2 = confirmed by the gateway but not recorded (ambiguous state the
/// caller must be told about).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status_code: u8,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: String,
    pub data: GatewayPayment,
}

#[derive(Debug, Serialize)]
pub struct PurchaseListResponse {
    pub message: String,
    pub data: Vec<PurchaseRow>,
}

/// Map a gateway client failure to a caller-facing error. Rejections
/// pass the gateway's status and payload through untouched.
fn map_gateway_error(err: GatewayError) -> AppError {
    match err {
        GatewayError::Rejected { status, body, .. } => {
            ERRORS_TOTAL.with_label_values(&["gateway_rejected"]).inc();
            AppError::Gateway { status, body }
        }
        GatewayError::Connection(e) => {
            ERRORS_TOTAL
                .with_label_values(&["gateway_connection"])
                .inc();
            AppError::BadGateway(e.to_string())
        }
        GatewayError::InvalidResponse(e) => {
            ERRORS_TOTAL.with_label_values(&["gateway_response"]).inc();
            AppError::BadGateway(format!("unparseable gateway body: {}", e))
        }
    }
}

/// The three-field verification check applied to every gateway record
/// before it is persisted.
fn payment_matches(payment: &GatewayPayment, payment_key: &str, order_id: &str) -> bool {
    payment.payment_key == payment_key
        && payment.order_id == order_id
        && payment.status == STATUS_DONE
}

enum RecordError {
    /// Gateway returned 200 but the record doesn't match the request.
    /// A distinct outcome from transport failure.
    Mismatch,
    /// Gateway verified the payment but the store write failed: the
    /// buyer may be charged with nothing recorded.
    Persistence(AppError),
}

/// Shared write path for confirm and verify: three-field check, then
/// the idempotent insert. Kept as one routine so the two handlers
/// cannot drift apart.
async fn record_verified_payment(
    state: &AppState,
    payment: &GatewayPayment,
    expected_payment_key: &str,
    expected_order_id: &str,
    buyer: &str,
) -> Result<(), RecordError> {
    if !payment_matches(payment, expected_payment_key, expected_order_id) {
        tracing::warn!(
            payment_key = %payment.payment_key,
            order_id = %payment.order_id,
            status = %payment.status,
            expected_payment_key,
            expected_order_id,
            "gateway record does not match the request"
        );
        return Err(RecordError::Mismatch);
    }

    let row = Payment {
        payment_key: payment.payment_key.clone(),
        order_id: payment.order_id.clone(),
        order_name: payment.order_name.clone(),
        total_amount: payment.total_amount,
        requested_at: payment.requested_at,
        approved_at: payment.approved_at,
        buyer: buyer.to_string(),
    };

    match state.db.record_payment(&row).await {
        Ok(inserted) => {
            let outcome = if inserted { "recorded" } else { "duplicate" };
            PAYMENTS_RECORDED.with_label_values(&[outcome]).inc();
            Ok(())
        }
        Err(e) => Err(RecordError::Persistence(e)),
    }
}

/// Confirm a payment with the gateway, verify the returned record, and
/// persist it.
///
/// POST /confirm
pub async fn confirm(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        payment_key = %payload.payment_key,
        order_id = %payload.order_id,
        amount = payload.amount,
        "Confirming payment"
    );

    let timer = GATEWAY_CALL_DURATION
        .with_label_values(&["confirm"])
        .start_timer();
    let result = state
        .gateway
        .confirm(&payload.payment_key, &payload.order_id, payload.amount)
        .await;
    timer.observe_duration();

    let payment = result.map_err(map_gateway_error)?;

    finish_record(&state, &payment, &payload.payment_key, &payload.order_id, &payload.buyer).await
}

/// Verify a payment against the gateway's record (a read, not a
/// confirm) and persist it through the same write path as confirm.
///
/// POST /verifyPayment
pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        payment_key = %payload.payment_key,
        order_id = %payload.order_id,
        buyer = %payload.buyer,
        "Verifying payment"
    );

    let timer = GATEWAY_CALL_DURATION
        .with_label_values(&["get_payment"])
        .start_timer();
    let result = state.gateway.get_payment(&payload.payment_key).await;
    timer.observe_duration();

    let payment = result.map_err(map_gateway_error)?;

    finish_record(&state, &payment, &payload.payment_key, &payload.order_id, &payload.buyer).await
}

/// Translate the shared write path's outcome into the caller-facing
/// {statusCode, message} reply used by both confirm and verify.
async fn finish_record(
    state: &AppState,
    payment: &GatewayPayment,
    expected_payment_key: &str,
    expected_order_id: &str,
    buyer: &str,
) -> Result<(StatusCode, Json<StatusResponse>), AppError> {
    match record_verified_payment(state, payment, expected_payment_key, expected_order_id, buyer)
        .await
    {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(StatusResponse {
                status_code: 0,
                message: "payment verified and recorded".to_string(),
            }),
        )),
        Err(RecordError::Mismatch) => Ok((
            StatusCode::BAD_REQUEST,
            Json(StatusResponse {
                status_code: 1,
                message: "payment verification failed".to_string(),
            }),
        )),
        Err(RecordError::Persistence(e)) => {
            ERRORS_TOTAL.with_label_values(&["persistence"]).inc();
            tracing::error!(
                error = %e,
                payment_key = %payment.payment_key,
                "payment confirmed by the gateway but not recorded"
            );
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse {
                    status_code: 2,
                    message: "payment confirmed but could not be recorded".to_string(),
                }),
            ))
        }
    }
}

/// Cancel a payment.
///
/// POST /cancelPayment
///
/// Runs as one transaction: the row lock is taken before the gateway
/// call so concurrent cancels of the same payment serialize, and the
/// cancellation insert + payment delete commit together or not at all.
/// Nothing is written before the gateway confirms the cancellation, so
/// a gateway failure leaves the store untouched.
pub async fn cancel(
    State(state): State<AppState>,
    Json(payload): Json<CancelRequest>,
) -> Result<(StatusCode, Json<CancelResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        buyer = %payload.buyer,
        order_name = %payload.order_name,
        cancel_amount = payload.cancel_amount,
        "Canceling payment"
    );

    let mut tx = state.db.begin().await?;

    let payment = state
        .db
        .lock_payment_for_cancel(&mut tx, &payload.buyer, &payload.order_name)
        .await?;

    let Some(payment) = payment else {
        tx.rollback().await.ok();
        return Err(AppError::NotFound(anyhow::anyhow!(
            "no payment found for buyer '{}' and order '{}'",
            payload.buyer,
            payload.order_name
        )));
    };

    let timer = GATEWAY_CALL_DURATION
        .with_label_values(&["cancel"])
        .start_timer();
    let result = state
        .gateway
        .cancel(
            &payment.payment_key,
            &payload.cancel_reason,
            payload.cancel_amount,
        )
        .await;
    timer.observe_duration();

    let canceled = match result {
        Ok(p) => p,
        Err(e) => {
            tx.rollback().await.ok();
            CANCELLATIONS_TOTAL.with_label_values(&["rolled_back"]).inc();
            return Err(map_gateway_error(e));
        }
    };

    if canceled.status != STATUS_CANCELED {
        tracing::warn!(
            payment_key = %payment.payment_key,
            gateway_status = %canceled.status,
            "gateway did not cancel the payment"
        );
        tx.rollback().await.ok();
        CANCELLATIONS_TOTAL.with_label_values(&["refused"]).inc();
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "gateway refused the cancellation (status {})",
            canceled.status
        )));
    }

    let record = Cancellation {
        payment_key: canceled.payment_key.clone(),
        order_id: canceled.order_id.clone(),
        order_name: canceled.order_name.clone(),
        status: canceled.status.clone(),
        requested_at: canceled.requested_at,
        approved_at: canceled.approved_at,
        cancel_reason: payload.cancel_reason.clone(),
        cancel_amount: payload.cancel_amount,
        buyer: payload.buyer.clone(),
    };

    // Insert + delete inside the same transaction. An error on either
    // statement propagates with `?`, dropping the transaction, which
    // rolls everything back: no cancellation without the delete, no
    // delete without the cancellation.
    state.db.insert_cancellation(&mut tx, &record).await?;
    let deleted = state.db.delete_payment(&mut tx, &payment.payment_key).await?;
    if deleted == 0 {
        tx.rollback().await.ok();
        CANCELLATIONS_TOTAL.with_label_values(&["rolled_back"]).inc();
        return Err(AppError::Conflict(anyhow::anyhow!(
            "payment '{}' disappeared during cancellation",
            payment.payment_key
        )));
    }

    tx.commit().await.map_err(|e| {
        CANCELLATIONS_TOTAL.with_label_values(&["rolled_back"]).inc();
        AppError::DatabaseError(anyhow::anyhow!("Failed to commit cancellation: {}", e))
    })?;

    CANCELLATIONS_TOTAL.with_label_values(&["canceled"]).inc();
    tracing::info!(
        payment_key = %payment.payment_key,
        buyer = %payload.buyer,
        "Payment canceled and recorded"
    );

    Ok((
        StatusCode::OK,
        Json(CancelResponse {
            message: "payment canceled and recorded".to_string(),
            data: canceled,
        }),
    ))
}

/// Purchase history for a buyer, most recent first.
///
/// GET /getPurchaseList?buyer=...
///
/// An empty history answers 404, matching the behavior callers already
/// depend on.
pub async fn purchase_list(
    State(state): State<AppState>,
    Query(query): Query<PurchaseListQuery>,
) -> Result<Json<PurchaseListResponse>, AppError> {
    query.validate()?;

    let rows = state.db.purchase_history(&query.buyer).await?;

    if rows.is_empty() {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "no purchase history for buyer '{}'",
            query.buyer
        )));
    }

    Ok(Json(PurchaseListResponse {
        message: "purchase history retrieved".to_string(),
        data: rows,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn gateway_payment(status: &str) -> GatewayPayment {
        GatewayPayment {
            payment_key: "pk_1".to_string(),
            order_id: "order_1".to_string(),
            order_name: "coffee beans".to_string(),
            status: status.to_string(),
            total_amount: 1000,
            requested_at: Utc::now(),
            approved_at: Utc::now(),
        }
    }

    #[test]
    fn matching_record_passes_the_check() {
        assert!(payment_matches(&gateway_payment("DONE"), "pk_1", "order_1"));
    }

    #[test]
    fn wrong_key_order_or_status_fails_the_check() {
        let payment = gateway_payment("DONE");
        assert!(!payment_matches(&payment, "pk_2", "order_1"));
        assert!(!payment_matches(&payment, "pk_1", "order_2"));
        assert!(!payment_matches(&gateway_payment("IN_PROGRESS"), "pk_1", "order_1"));
        assert!(!payment_matches(&gateway_payment("CANCELED"), "pk_1", "order_1"));
    }

    #[test]
    fn missing_fields_fail_validation() {
        // Absent fields deserialize to defaults and must be caught by
        // validation, not by serde.
        let payload: ConfirmRequest =
            serde_json::from_str(r#"{"paymentKey": "pk_1", "orderId": "order_1"}"#).unwrap();
        assert!(payload.validate().is_err());

        let payload: CancelRequest = serde_json::from_str(r#"{"buyer": "u1"}"#).unwrap();
        assert!(payload.validate().is_err());

        let query: PurchaseListQuery = serde_json::from_str(r#"{}"#).unwrap();
        assert!(query.validate().is_err());
    }

    #[test]
    fn complete_payloads_pass_validation() {
        let payload: ConfirmRequest = serde_json::from_str(
            r#"{"paymentKey": "pk_1", "orderId": "order_1", "amount": 1000, "buyer": "u1"}"#,
        )
        .unwrap();
        assert!(payload.validate().is_ok());

        let payload: CancelRequest = serde_json::from_str(
            r#"{"buyer": "u1", "orderName": "coffee beans", "cancelReason": "r", "cancelAmount": 1000}"#,
        )
        .unwrap();
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn gateway_failures_are_counted() {
        let before = ERRORS_TOTAL.with_label_values(&["gateway_response"]).get();

        let parse_err = serde_json::from_str::<GatewayPayment>("not json").unwrap_err();
        let err = map_gateway_error(GatewayError::InvalidResponse(parse_err));
        assert!(matches!(err, AppError::BadGateway(_)));

        let after = ERRORS_TOTAL.with_label_values(&["gateway_response"]).get();
        assert_eq!(after - before, 1.0);
    }

    #[test]
    fn status_response_uses_camel_case() {
        let body = serde_json::to_value(StatusResponse {
            status_code: 0,
            message: "ok".to_string(),
        })
        .unwrap();
        assert_eq!(body["statusCode"], 0);
    }
}
