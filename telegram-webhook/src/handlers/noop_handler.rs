//! No-op handler: logs the update and succeeds. Default handler when no bot logic is wired in.

use async_trait::async_trait;
use tracing::info;

use crate::core::{Handler, HandlerError, InboundUpdate};

/// Handler that only logs; always succeeds.
#[derive(Clone, Default)]
pub struct NoOpHandler;

impl NoOpHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for NoOpHandler {
    async fn handle(&self, update: &InboundUpdate) -> Result<(), HandlerError> {
        info!(
            update_id = %update.id(),
            chat_id = ?update.chat_id(),
            "Update received (no-op)"
        );
        Ok(())
    }
}
