//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use telegram_webhook::{
    AuthScheme, DedupLedger, DispatchConfig, DispatchQueue, Handler, HandlerError, InboundUpdate,
    RetryPolicy, TracingDeadLetterSink, UpdateValidator, WebhookEndpoint,
};
use tokio::sync::Semaphore;

pub const SECRET: &str = "test-secret";
pub const PATH: &str = "telegram";

/// Records handled update ids; fails every attempt when `fail` is set. When a gate is given,
/// each call waits for a permit first.
#[derive(Default)]
pub struct RecordingHandler {
    pub handled: Mutex<Vec<String>>,
    pub calls: AtomicU32,
    pub fail: bool,
    pub gate: Option<Arc<Semaphore>>,
}

impl RecordingHandler {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn handled(&self) -> Vec<String> {
        self.handled.lock().unwrap().clone()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle(&self, update: &InboundUpdate) -> Result<(), HandlerError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(HandlerError::Failed("downstream unavailable".to_string()));
        }
        self.handled.lock().unwrap().push(update.id().to_string());
        Ok(())
    }
}

pub fn dispatch_config(workers: usize, queue_depth: usize, max_retries: u32) -> DispatchConfig {
    DispatchConfig {
        workers,
        queue_depth,
        retry: RetryPolicy::fixed(max_retries, Duration::from_millis(1), Duration::from_millis(5)),
        handler_timeout: Duration::from_secs(5),
    }
}

/// Endpoint with secret-token auth, a 24h ledger and a tracing dead-letter sink.
pub fn endpoint(handler: Arc<dyn Handler>, config: DispatchConfig) -> Arc<WebhookEndpoint> {
    let queue = DispatchQueue::start(config, handler, Arc::new(TracingDeadLetterSink));
    Arc::new(WebhookEndpoint::new(
        UpdateValidator::new(SECRET, AuthScheme::SecretToken),
        Arc::new(DedupLedger::default()),
        Arc::new(queue),
        PATH,
    ))
}
