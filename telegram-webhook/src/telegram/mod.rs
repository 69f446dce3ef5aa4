//! Telegram layer: Bot capability over teloxide and webhook registration.

mod bot_adapter;
mod webhook_setup;

pub use bot_adapter::{build_teloxide_bot, TelegramBotAdapter};
pub use webhook_setup::{delete_webhook, ensure_webhook, webhook_url, WebhookRegistration};
