//! Outbound messaging capability used by handlers.
//!
//! [`Bot`] is transport-agnostic; `crate::telegram::TelegramBotAdapter` implements it via teloxide.
//! Tests substitute their own implementation.

use async_trait::async_trait;

use crate::core::error::Result;

/// Sends content to a chat. Implementations map to a transport (e.g. Telegram Bot API).
#[async_trait]
pub trait Bot: Send + Sync {
    /// Sends a text message to the given chat.
    async fn send_message(&self, chat_id: i64, content: &str) -> Result<()>;
}
