//! Payment gateway client.
//!
//! Issues the confirm / get / cancel calls against the external payment
//! API. The Basic credential is derived from the secret key once, at
//! construction, and reused for every call.

use crate::config::GatewayConfig;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Client for the payment gateway's payments API.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    authorization: String,
}

/// Confirm request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest<'a> {
    payment_key: &'a str,
    order_id: &'a str,
    amount: i64,
}

/// Cancel request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelRequest<'a> {
    cancel_reason: &'a str,
    cancel_amount: i64,
}

/// Payment record as returned by the gateway.
///
/// The gateway's bodies carry more fields than these; everything the
/// reconciliation flow does not read is ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPayment {
    pub payment_key: String,
    pub order_id: String,
    pub order_name: String,
    pub status: String,
    pub total_amount: i64,
    pub requested_at: DateTime<Utc>,
    pub approved_at: DateTime<Utc>,
}

/// Gateway error payload (`{"code": ..., "message": ...}`).
#[derive(Debug, Deserialize)]
pub struct GatewayErrorBody {
    pub code: String,
    pub message: String,
}

/// Failure modes of a gateway call. No retries anywhere: every error
/// surfaces to the handler on the first attempt.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("gateway connection failed: {0}")]
    Connection(#[from] reqwest::Error),

    /// The gateway answered with a non-2xx status. The raw payload is
    /// kept so handlers can pass it through to the caller.
    #[error("gateway rejected the request ({status}): {code}: {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
        body: serde_json::Value,
    },

    /// 2xx reply whose body did not parse as a payment record.
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(#[source] serde_json::Error),
}

/// Basic credential in the form the gateway expects:
/// `base64(secret_key + ":")`, the secret key as username with no password.
fn basic_credential(secret_key: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:", secret_key))
    )
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            authorization: basic_credential(config.secret_key.expose_secret()),
        })
    }

    /// Confirm a payment: `POST /v1/payments/confirm`.
    pub async fn confirm(
        &self,
        payment_key: &str,
        order_id: &str,
        amount: i64,
    ) -> Result<GatewayPayment, GatewayError> {
        let url = format!("{}/v1/payments/confirm", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .json(&ConfirmRequest {
                payment_key,
                order_id,
                amount,
            })
            .send()
            .await?;

        self.read_payment(response, "confirm").await
    }

    /// Fetch a payment record: `GET /v1/payments/{paymentKey}`.
    pub async fn get_payment(&self, payment_key: &str) -> Result<GatewayPayment, GatewayError> {
        let url = format!("{}/v1/payments/{}", self.base_url, payment_key);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .send()
            .await?;

        self.read_payment(response, "get_payment").await
    }

    /// Cancel a payment: `POST /v1/payments/{paymentKey}/cancel`.
    pub async fn cancel(
        &self,
        payment_key: &str,
        cancel_reason: &str,
        cancel_amount: i64,
    ) -> Result<GatewayPayment, GatewayError> {
        let url = format!("{}/v1/payments/{}/cancel", self.base_url, payment_key);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .json(&CancelRequest {
                cancel_reason,
                cancel_amount,
            })
            .send()
            .await?;

        self.read_payment(response, "cancel").await
    }

    async fn read_payment(
        &self,
        response: reqwest::Response,
        operation: &str,
    ) -> Result<GatewayPayment, GatewayError> {
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(operation, status = %status, body = %body, "gateway response");

        if status.is_success() {
            let payment: GatewayPayment =
                serde_json::from_str(&body).map_err(GatewayError::InvalidResponse)?;
            tracing::info!(
                operation,
                payment_key = %payment.payment_key,
                order_id = %payment.order_id,
                payment_status = %payment.status,
                "gateway call succeeded"
            );
            Ok(payment)
        } else {
            let raw: serde_json::Value =
                serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
            let parsed: GatewayErrorBody =
                serde_json::from_str(&body).unwrap_or_else(|_| GatewayErrorBody {
                    code: "UNKNOWN".to_string(),
                    message: body.clone(),
                });
            tracing::error!(
                operation,
                status = %status,
                code = %parsed.code,
                message = %parsed.message,
                "gateway call rejected"
            );
            Err(GatewayError::Rejected {
                status: status.as_u16(),
                code: parsed.code,
                message: parsed.message,
                body: raw,
            })
        }
    }
}
