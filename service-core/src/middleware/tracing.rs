//! Request-id propagation.

use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

/// Header carrying the correlation id across services.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Ensures every request carries a request id: an incoming
/// `x-request-id` is kept, anything else gets a fresh UUID. The id is
/// recorded on the current request span and echoed on the response so
/// callers can correlate logs with replies.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let header_value = match req.headers().get(REQUEST_ID_HEADER) {
        Some(value) => value.clone(),
        None => HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    };

    if let Ok(id) = header_value.to_str() {
        tracing::Span::current().record("request_id", id);
    }

    req.headers_mut()
        .insert(REQUEST_ID_HEADER, header_value.clone());

    let mut response = next.run(req).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body, http::Request as HttpRequest, middleware::from_fn, routing::get, Router,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn incoming_request_id_is_echoed() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/ping")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");
    }

    #[tokio::test]
    async fn missing_request_id_gets_a_generated_one() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }
}
