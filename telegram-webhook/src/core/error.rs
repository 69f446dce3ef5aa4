//! Error types for the webhook core.
//!
//! [`WebhookError`] covers the request path and startup; [`HandlerError`] is what a handler
//! attempt can fail with inside the dispatch queue and never reaches the webhook caller.

use std::time::Duration;

use thiserror::Error;

/// Top-level error (authentication, payload, backpressure, config, bot transport, IO).
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Dispatch queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Dispatch queue is closed")]
    QueueClosed,

    #[error("Startup config error: {0}")]
    StartupConfig(String),

    #[error("Bot error: {0}")]
    Bot(String),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by a single handler attempt. Every variant is retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Bot error: {0}")]
    Bot(String),
}

/// Result type for core operations; uses [`WebhookError`].
pub type Result<T> = std::result::Result<T, WebhookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_full_message_includes_capacity() {
        let err = WebhookError::QueueFull { capacity: 8 };
        assert_eq!(err.to_string(), "Dispatch queue is full (capacity 8)");
    }

    #[test]
    fn test_handler_error_converts_into_webhook_error() {
        let err: WebhookError = HandlerError::Timeout(Duration::from_secs(2)).into();
        assert!(matches!(err, WebhookError::Handler(HandlerError::Timeout(_))));
        assert_eq!(err.to_string(), "Handler error: Handler timed out after 2s");
    }
}
