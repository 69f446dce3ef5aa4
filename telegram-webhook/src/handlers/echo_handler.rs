//! Echo handler: sends a message's text back to its chat through the [`Bot`] capability.
//! Used to smoke-test the delivery path end to end.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::{Bot, Handler, HandlerError, InboundUpdate};

pub struct EchoHandler {
    bot: Arc<dyn Bot>,
}

impl EchoHandler {
    pub fn new(bot: Arc<dyn Bot>) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, update: &InboundUpdate) -> Result<(), HandlerError> {
        let (Some(chat_id), Some(text)) = (update.chat_id(), update.text()) else {
            debug!(update_id = %update.id(), "Update has no text message, nothing to echo");
            return Ok(());
        };

        self.bot
            .send_message(chat_id, text)
            .await
            .map_err(|e| HandlerError::Bot(e.to_string()))
    }
}
