//! Webhook endpoint: `POST /webhook/{path}`.
//!
//! Validate → dedup → enqueue → acknowledge. The response never waits for the handler; callers
//! only see the acknowledgement or an explicit rejection.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::header::{HeaderValue, RETRY_AFTER};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::core::{Result, WebhookError};
use crate::dispatch::DispatchQueue;
use crate::ledger::DedupLedger;
use crate::validator::UpdateValidator;

/// How an accepted request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// New update, queued for the handler.
    Accepted,
    /// Already seen within the retention window; nothing queued.
    Duplicate,
}

#[derive(Serialize)]
struct AckBody {
    ok: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    duplicate: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: &'static str,
    message: String,
}

impl IntoResponse for Ack {
    fn into_response(self) -> Response {
        let body = AckBody {
            ok: true,
            duplicate: self == Ack::Duplicate,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            WebhookError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "authentication failed".to_string(),
            ),
            WebhookError::MalformedPayload(msg) => {
                (StatusCode::BAD_REQUEST, "malformed_payload", msg.clone())
            }
            WebhookError::QueueFull { .. } | WebhookError::QueueClosed => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                self.to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "internal error".to_string(),
            ),
        };

        let mut response = (
            status,
            Json(ErrorBody {
                ok: false,
                error: code,
                message,
            }),
        )
            .into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// Composes the validator, ledger and queue behind the webhook path.
pub struct WebhookEndpoint {
    validator: UpdateValidator,
    ledger: Arc<DedupLedger>,
    queue: Arc<DispatchQueue>,
    path: String,
}

impl WebhookEndpoint {
    pub fn new(
        validator: UpdateValidator,
        ledger: Arc<DedupLedger>,
        queue: Arc<DispatchQueue>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            validator,
            ledger,
            queue,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn ledger(&self) -> &Arc<DedupLedger> {
        &self.ledger
    }

    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    /// Runs one request through validation, dedup and submission.
    ///
    /// Authentication and payload errors return before the ledger or queue is touched. When the
    /// queue rejects the update its ledger entry is removed again, so the platform's redelivery
    /// is processed instead of being acknowledged as a duplicate.
    pub fn receive(&self, headers: &HeaderMap, body: &[u8]) -> Result<Ack> {
        let update = self.validator.validate(headers, body)?;
        let update_id = update.id().to_string();

        if !self.ledger.check_and_record(&update_id) {
            info!(update_id = %update_id, "Duplicate update acknowledged");
            return Ok(Ack::Duplicate);
        }

        if let Err(e) = self.queue.submit(update) {
            self.ledger.forget(&update_id);
            return Err(e);
        }

        debug!(update_id = %update_id, "Update accepted");
        Ok(Ack::Accepted)
    }
}

/// Builds the router: `POST /webhook/{path}` with a request body limit of `max_body_bytes`.
pub fn router(endpoint: Arc<WebhookEndpoint>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/webhook/{path}", post(receive_update))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(endpoint)
}

#[instrument(skip(endpoint, headers, body), fields(body_len = body.len()))]
async fn receive_update(
    State(endpoint): State<Arc<WebhookEndpoint>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if path != endpoint.path {
        debug!(path = %path, "Unknown webhook path");
        return StatusCode::NOT_FOUND.into_response();
    }

    match endpoint.receive(&headers, &body) {
        Ok(ack) => ack.into_response(),
        Err(e) => {
            match &e {
                WebhookError::Authentication(reason) => {
                    warn!(reason = %reason, "Rejected unauthenticated webhook request")
                }
                WebhookError::MalformedPayload(reason) => {
                    warn!(reason = %reason, "Rejected malformed webhook payload")
                }
                WebhookError::QueueFull { .. } | WebhookError::QueueClosed => {
                    warn!(error = %e, "Rejected webhook request, dispatch unavailable")
                }
                other => error!(error = %other, "Webhook request failed"),
            }
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Handler, HandlerError, InboundUpdate};
    use crate::dispatch::{DispatchConfig, RetryPolicy, TracingDeadLetterSink};
    use crate::validator::{AuthScheme, SECRET_TOKEN_HEADER};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self, _update: &InboundUpdate) -> std::result::Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn endpoint(handler: Arc<CountingHandler>, queue_depth: usize) -> WebhookEndpoint {
        let config = DispatchConfig {
            workers: 1,
            queue_depth,
            retry: RetryPolicy::fixed(0, Duration::ZERO, Duration::ZERO),
            handler_timeout: Duration::from_secs(5),
        };
        let queue = DispatchQueue::start(config, handler, Arc::new(TracingDeadLetterSink));
        WebhookEndpoint::new(
            UpdateValidator::new("secret", AuthScheme::SecretToken),
            Arc::new(DedupLedger::default()),
            Arc::new(queue),
            "telegram",
        )
    }

    fn authed() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_TOKEN_HEADER, HeaderValue::from_static("secret"));
        headers
    }

    #[tokio::test]
    async fn test_duplicate_is_acknowledged_without_second_dispatch() {
        let handler = Arc::new(CountingHandler::default());
        let endpoint = endpoint(handler.clone(), 8);

        let body = br#"{"update_id": "upd-1"}"#;
        assert_eq!(endpoint.receive(&authed(), body).unwrap(), Ack::Accepted);
        assert_eq!(endpoint.receive(&authed(), body).unwrap(), Ack::Duplicate);

        endpoint.queue().shutdown().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_leaves_state_untouched() {
        let handler = Arc::new(CountingHandler::default());
        let endpoint = endpoint(handler.clone(), 8);

        let result = endpoint.receive(&HeaderMap::new(), br#"{"update_id": 1}"#);
        assert!(matches!(result, Err(WebhookError::Authentication(_))));
        assert!(endpoint.ledger().is_empty());
        assert_eq!(endpoint.queue().stats().submitted, 0);

        endpoint.queue().shutdown().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_queue_full_rolls_back_ledger_entry() {
        let handler = Arc::new(CountingHandler::default());
        let endpoint = endpoint(handler, 1);

        // Current-thread runtime: the worker does not run until this test yields, so the second
        // update finds the single slot taken.
        assert_eq!(
            endpoint.receive(&authed(), br#"{"update_id": 1}"#).unwrap(),
            Ack::Accepted
        );
        let result = endpoint.receive(&authed(), br#"{"update_id": 2}"#);
        assert!(matches!(result, Err(WebhookError::QueueFull { capacity: 1 })));
        assert!(!endpoint.ledger().seen("2"));
        assert!(endpoint.ledger().seen("1"));

        endpoint.queue().shutdown().await;
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (WebhookError::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (WebhookError::MalformedPayload("x".into()), StatusCode::BAD_REQUEST),
            (WebhookError::QueueFull { capacity: 1 }, StatusCode::SERVICE_UNAVAILABLE),
            (WebhookError::QueueClosed, StatusCode::SERVICE_UNAVAILABLE),
            (WebhookError::Bot("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
