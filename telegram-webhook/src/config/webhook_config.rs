//! WebhookConfig: everything the server needs, loaded once from env at startup and passed to
//! every component.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::core::{Result, WebhookError};
use crate::dispatch::{DispatchConfig, RetryPolicy};
use crate::telegram::webhook_url;
use crate::validator::AuthScheme;

/// Server configuration. Use [`WebhookConfig::load`] then [`WebhookConfig::validate`].
#[derive(Clone)]
pub struct WebhookConfig {
    /// BOT_TOKEN
    pub bot_token: String,
    /// WEBHOOK_SECRET
    pub webhook_secret: String,
    /// WEBHOOK_AUTH
    pub auth_scheme: AuthScheme,
    /// WEBHOOK_PATH: the `{path}` in `POST /webhook/{path}`
    pub webhook_path: String,
    /// WEBHOOK_PUBLIC_URL: when set, the webhook is registered with the Bot API at startup
    pub public_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// WORKER_CONCURRENCY
    pub workers: usize,
    pub queue_depth: usize,
    /// Retries after the first handler attempt
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub handler_timeout_secs: u64,
    pub dedup_retention_secs: u64,
    pub max_body_bytes: usize,
    pub dead_letter_file: String,
    pub log_file: String,
    /// TELEGRAM_API_URL or TELOXIDE_API_URL
    pub telegram_api_url: Option<String>,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("bot_token", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("auth_scheme", &self.auth_scheme)
            .field("webhook_path", &self.webhook_path)
            .field("public_url", &self.public_url)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("workers", &self.workers)
            .field("queue_depth", &self.queue_depth)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("handler_timeout_secs", &self.handler_timeout_secs)
            .field("dedup_retention_secs", &self.dedup_retention_secs)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("dead_letter_file", &self.dead_letter_file)
            .field("log_file", &self.log_file)
            .field("telegram_api_url", &self.telegram_api_url)
            .finish()
    }
}

impl WebhookConfig {
    /// Loads from environment variables. `token` overrides BOT_TOKEN if provided.
    ///
    /// Missing BOT_TOKEN or WEBHOOK_SECRET and unparsable values are startup errors.
    pub fn load(token: Option<String>) -> Result<Self> {
        let bot_token = match token {
            Some(token) => token,
            None => required("BOT_TOKEN")?,
        };
        let webhook_secret = required("WEBHOOK_SECRET")?;
        let auth_scheme = match optional("WEBHOOK_AUTH") {
            Some(value) => value.parse()?,
            None => AuthScheme::default(),
        };
        let webhook_path = optional("WEBHOOK_PATH").unwrap_or_else(|| "telegram".to_string());
        let public_url = optional("WEBHOOK_PUBLIC_URL");
        let host = optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", 3000)?;
        let workers = parse_or("WORKER_CONCURRENCY", 4)?;
        let queue_depth = parse_or("QUEUE_DEPTH", 1024)?;
        let max_retries = parse_or("MAX_RETRIES", 3)?;
        let retry_base_delay_ms = parse_or("RETRY_BASE_DELAY_MS", 500)?;
        let retry_max_delay_ms = parse_or("RETRY_MAX_DELAY_MS", 30_000)?;
        let handler_timeout_secs = parse_or("HANDLER_TIMEOUT_SECS", 30)?;
        let dedup_retention_secs = parse_or("DEDUP_RETENTION_SECS", 24 * 60 * 60)?;
        let max_body_bytes = parse_or("MAX_BODY_BYTES", 1024 * 1024)?;
        let dead_letter_file = optional("DEAD_LETTER_FILE")
            .unwrap_or_else(|| "logs/dead_letters.jsonl".to_string());
        let log_file =
            optional("LOG_FILE").unwrap_or_else(|| "logs/telegram-webhook.log".to_string());
        let telegram_api_url = optional("TELEGRAM_API_URL").or_else(|| optional("TELOXIDE_API_URL"));

        Ok(Self {
            bot_token,
            webhook_secret,
            auth_scheme,
            webhook_path,
            public_url,
            host,
            port,
            workers,
            queue_depth,
            max_retries,
            retry_base_delay_ms,
            retry_max_delay_ms,
            handler_timeout_secs,
            dedup_retention_secs,
            max_body_bytes,
            dead_letter_file,
            log_file,
            telegram_api_url,
        })
    }

    /// Config with the given token and secret; every other field at its default.
    pub fn with_secrets(bot_token: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            webhook_secret: webhook_secret.into(),
            auth_scheme: AuthScheme::default(),
            webhook_path: "telegram".to_string(),
            public_url: None,
            host: "0.0.0.0".to_string(),
            port: 3000,
            workers: 4,
            queue_depth: 1024,
            max_retries: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            handler_timeout_secs: 30,
            dedup_retention_secs: 24 * 60 * 60,
            max_body_bytes: 1024 * 1024,
            dead_letter_file: "logs/dead_letters.jsonl".to_string(),
            log_file: "logs/telegram-webhook.log".to_string(),
            telegram_api_url: None,
        }
    }

    /// Validates config. Call after load() to fail fast before serving traffic.
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            return Err(config_error("BOT_TOKEN must not be empty"));
        }
        if self.webhook_secret.is_empty() {
            return Err(config_error("WEBHOOK_SECRET must not be empty"));
        }
        // The Bot API only accepts 1-256 characters from [A-Za-z0-9_-] as secret_token.
        if self.auth_scheme == AuthScheme::SecretToken
            && (self.webhook_secret.len() > 256 || !is_url_safe(&self.webhook_secret))
        {
            return Err(config_error(
                "WEBHOOK_SECRET must be 1-256 characters of A-Z, a-z, 0-9, _ or - for secret_token auth",
            ));
        }
        if self.webhook_path.is_empty() || !is_url_safe(&self.webhook_path) {
            return Err(config_error(
                "WEBHOOK_PATH must be non-empty and use only A-Z, a-z, 0-9, _ or -",
            ));
        }
        if self.workers == 0 {
            return Err(config_error("WORKER_CONCURRENCY must be at least 1"));
        }
        if self.queue_depth == 0 {
            return Err(config_error("QUEUE_DEPTH must be at least 1"));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(config_error(
                "RETRY_BASE_DELAY_MS must not exceed RETRY_MAX_DELAY_MS",
            ));
        }
        if self.handler_timeout_secs == 0 {
            return Err(config_error("HANDLER_TIMEOUT_SECS must be at least 1"));
        }
        if self.dedup_retention_secs == 0 {
            return Err(config_error("DEDUP_RETENTION_SECS must be at least 1"));
        }
        if self.max_body_bytes == 0 {
            return Err(config_error("MAX_BODY_BYTES must be at least 1"));
        }
        if let Some(ref public_url) = self.public_url {
            webhook_url(public_url, &self.webhook_path)?;
        }
        if let Some(ref url_str) = self.telegram_api_url {
            if reqwest::Url::parse(url_str).is_err() {
                return Err(config_error(&format!(
                    "TELEGRAM_API_URL (or TELOXIDE_API_URL) is set but not a valid URL: {url_str}"
                )));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter: true,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            workers: self.workers,
            queue_depth: self.queue_depth,
            retry: self.retry_policy(),
            handler_timeout: Duration::from_secs(self.handler_timeout_secs),
        }
    }

    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs)
    }
}

fn config_error(msg: &str) -> WebhookError {
    WebhookError::StartupConfig(msg.to_string())
}

fn is_url_safe(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Non-empty value of `key`, if set.
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| WebhookError::StartupConfig(format!("{key} not set")))
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match optional(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            WebhookError::StartupConfig(format!("{key} has invalid value {raw:?}: {e}"))
        }),
        None => Ok(default),
    }
}
