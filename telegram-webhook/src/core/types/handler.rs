//! Handler trait run by the dispatch queue workers.

use async_trait::async_trait;

use super::update::InboundUpdate;
use crate::core::error::HandlerError;

/// Processes one update. An `Err` (or a panic, or exceeding the queue's handler timeout) counts as
/// a failed attempt; the queue retries it with backoff and dead-letters it once retries run out.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, update: &InboundUpdate) -> Result<(), HandlerError>;
}
