//! Webhook registration with the Bot API, kept separate from request serving.
//!
//! [`ensure_webhook`] is idempotent: it reads the current registration and only calls
//! `setWebhook` when the URL differs (or when forced, e.g. after rotating the secret). Transient
//! API failures are retried with the given policy.

use reqwest::Url;
use teloxide::payloads::SetWebhookSetters;
use teloxide::requests::Requester;
use tracing::{info, instrument, warn};

use crate::core::{Result, WebhookError};
use crate::dispatch::RetryPolicy;

/// Outcome of [`ensure_webhook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookRegistration {
    /// The Bot API already pointed at the URL; nothing was changed.
    AlreadyConfigured,
    /// `setWebhook` was called.
    Registered,
}

/// Makes sure the bot's webhook points at `url`, registering `secret_token` with it.
#[instrument(skip(bot, secret_token, retry), fields(url = %url))]
pub async fn ensure_webhook(
    bot: &teloxide::Bot,
    url: &Url,
    secret_token: Option<&str>,
    force: bool,
    retry: &RetryPolicy,
) -> Result<WebhookRegistration> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match try_ensure_webhook(bot, url, secret_token, force).await {
            Ok(outcome) => {
                info!(?outcome, attempts, "Webhook configuration ensured");
                return Ok(outcome);
            }
            Err(e) if retry.should_retry(attempts) => {
                let delay = retry.delay_for(attempts);
                warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Webhook registration failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn try_ensure_webhook(
    bot: &teloxide::Bot,
    url: &Url,
    secret_token: Option<&str>,
    force: bool,
) -> Result<WebhookRegistration> {
    if !force {
        let current = bot
            .get_webhook_info()
            .await
            .map_err(|e| WebhookError::Bot(e.to_string()))?;
        if current.url.as_ref() == Some(url) {
            return Ok(WebhookRegistration::AlreadyConfigured);
        }
    }

    let mut request = bot.set_webhook(url.clone());
    if let Some(secret) = secret_token {
        request = request.secret_token(secret.to_string());
    }
    request
        .await
        .map_err(|e| WebhookError::Bot(e.to_string()))?;
    Ok(WebhookRegistration::Registered)
}

/// Removes the webhook registration (switches the bot back to polling mode).
#[instrument(skip(bot))]
pub async fn delete_webhook(bot: &teloxide::Bot) -> Result<()> {
    bot.delete_webhook()
        .await
        .map_err(|e| WebhookError::Bot(e.to_string()))?;
    info!("Webhook deleted");
    Ok(())
}

/// Joins the public base URL and the webhook path into the URL registered with the Bot API:
/// `{base}/webhook/{path}`.
pub fn webhook_url(public_base: &str, path: &str) -> Result<Url> {
    let base = public_base.trim_end_matches('/');
    let joined = format!("{base}/webhook/{}", path.trim_matches('/'));
    Url::parse(&joined).map_err(|e| {
        WebhookError::StartupConfig(format!("Invalid WEBHOOK_PUBLIC_URL {public_base}: {e}"))
    })
}
