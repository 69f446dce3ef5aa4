//! Wraps teloxide::Bot and implements [`crate::core::Bot`]. Production handlers send through
//! Telegram; tests can substitute another Bot impl.

use async_trait::async_trait;
use teloxide::{prelude::*, types::ChatId};

use crate::core::{Bot as CoreBot, Result, WebhookError};

/// Thin wrapper around teloxide::Bot that implements core's Bot trait.
#[derive(Clone)]
pub struct TelegramBotAdapter {
    bot: teloxide::Bot,
}

impl TelegramBotAdapter {
    pub fn new(bot: teloxide::Bot) -> Self {
        Self { bot }
    }

    /// Returns the underlying teloxide::Bot for direct API use when needed.
    pub fn inner(&self) -> &teloxide::Bot {
        &self.bot
    }
}

#[async_trait]
impl CoreBot for TelegramBotAdapter {
    async fn send_message(&self, chat_id: i64, content: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), content.to_string())
            .await
            .map_err(|e| WebhookError::Bot(e.to_string()))?;
        Ok(())
    }
}

/// Builds a teloxide Bot for `token`, pointed at `api_url` when given (e.g. a mock server).
pub fn build_teloxide_bot(token: &str, api_url: Option<&str>) -> Result<teloxide::Bot> {
    let bot = teloxide::Bot::new(token);
    match api_url {
        Some(url_str) => {
            let url = reqwest::Url::parse(url_str).map_err(|e| {
                WebhookError::StartupConfig(format!("Invalid TELEGRAM_API_URL {url_str}: {e}"))
            })?;
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_bot_with_api_url() {
        let bot = build_teloxide_bot("123:abc", Some("http://127.0.0.1:9999")).unwrap();
        assert_eq!(bot.api_url().as_str(), "http://127.0.0.1:9999/");
    }

    #[test]
    fn test_build_bot_rejects_invalid_api_url() {
        assert!(matches!(
            build_teloxide_bot("123:abc", Some("not a url")),
            Err(WebhookError::StartupConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_send_message_posts_to_bot_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                mockito::Matcher::Regex(r"(?i)^/bot123:abc/sendmessage$".to_string()),
            )
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"chat_id": 42, "text": "hello"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                "ok": true,
                "result": {
                    "message_id": 1,
                    "date": 1706529600,
                    "chat": {"id": 42, "type": "private", "first_name": "Test"},
                    "text": "hello"
                }
            }"#,
            )
            .create_async()
            .await;

        let bot = build_teloxide_bot("123:abc", Some(&server.url())).unwrap();
        let adapter = TelegramBotAdapter::new(bot);
        adapter.send_message(42, "hello").await.unwrap();

        mock.assert_async().await;
    }
}
