//! Server runner: validates config, initializes logging, registers the webhook, builds the
//! endpoint and serves it until Ctrl-C, then drains the dispatch queue.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, instrument};

use crate::config::WebhookConfig;
use crate::core::{init_tracing, Bot, Handler};
use crate::dispatch::{DispatchQueue, JsonlDeadLetterSink};
use crate::endpoint::{router, WebhookEndpoint};
use crate::ledger::DedupLedger;
use crate::telegram::{
    build_teloxide_bot, delete_webhook, ensure_webhook, webhook_url, TelegramBotAdapter,
    WebhookRegistration,
};
use crate::validator::{AuthScheme, UpdateValidator};

/// Builds validator, ledger and dispatch queue from config. Spawns the queue's workers, so it
/// must run inside a tokio runtime.
pub fn build_endpoint(config: &WebhookConfig, handler: Arc<dyn Handler>) -> Arc<WebhookEndpoint> {
    let validator = UpdateValidator::new(config.webhook_secret.clone(), config.auth_scheme);
    let ledger = Arc::new(DedupLedger::new(config.dedup_retention()));
    let dead_letters = Arc::new(JsonlDeadLetterSink::new(config.dead_letter_file.clone()));
    let queue = DispatchQueue::start(config.dispatch_config(), handler, dead_letters);
    Arc::new(WebhookEndpoint::new(
        validator,
        ledger,
        Arc::new(queue),
        config.webhook_path.clone(),
    ))
}

/// Serves the endpoint on `listener` until `shutdown` resolves, then drains the queue.
pub async fn serve<S>(
    listener: TcpListener,
    endpoint: Arc<WebhookEndpoint>,
    max_body_bytes: usize,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(addr = %addr, path = %endpoint.path(), "Webhook server listening");

    let app = router(endpoint.clone(), max_body_bytes);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("webhook server failed")?;

    info!("Webhook server stopped accepting requests");
    endpoint.queue().shutdown().await;
    Ok(())
}

/// Main entry: validate config, init logging, register the webhook when a public URL is set,
/// create the handler via `make_handler`, then serve until Ctrl-C.
///
/// `make_handler` receives the config and the Bot capability (teloxide-backed).
#[instrument(skip(config, make_handler))]
pub async fn run_server<F>(config: WebhookConfig, make_handler: F) -> Result<()>
where
    F: FnOnce(&WebhookConfig, Arc<dyn Bot>) -> Arc<dyn Handler>,
{
    config.validate()?;
    init_tracing(&config.log_file)?;

    info!(
        auth_scheme = %config.auth_scheme,
        workers = config.workers,
        queue_depth = config.queue_depth,
        max_retries = config.max_retries,
        dedup_retention_secs = config.dedup_retention_secs,
        "Initializing webhook server"
    );

    let teloxide_bot = build_teloxide_bot(&config.bot_token, config.telegram_api_url.as_deref())?;

    if config.public_url.is_some() {
        // Registration is independent of serving: a failure is logged and the server still
        // starts, since an earlier registration may already be in place.
        if let Err(e) = register(&teloxide_bot, &config, false).await {
            error!(error = %e, "Webhook registration failed; serving anyway");
        }
    }

    let bot: Arc<dyn Bot> = Arc::new(TelegramBotAdapter::new(teloxide_bot));
    let handler = make_handler(&config, bot);
    let endpoint = build_endpoint(&config, handler);

    let listener = TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr()))?;

    serve(listener, endpoint, config.max_body_bytes, shutdown_signal()).await
}

/// Runs only the webhook registration step (`set-webhook` command).
#[instrument(skip(config))]
pub async fn register_webhook(config: WebhookConfig, force: bool) -> Result<WebhookRegistration> {
    config.validate()?;
    init_tracing(&config.log_file)?;
    let bot = build_teloxide_bot(&config.bot_token, config.telegram_api_url.as_deref())?;
    Ok(register(&bot, &config, force).await?)
}

/// Removes the webhook registration (`delete-webhook` command).
#[instrument(skip(config))]
pub async fn unregister_webhook(config: WebhookConfig) -> Result<()> {
    config.validate()?;
    init_tracing(&config.log_file)?;
    let bot = build_teloxide_bot(&config.bot_token, config.telegram_api_url.as_deref())?;
    delete_webhook(&bot).await?;
    Ok(())
}

async fn register(
    bot: &teloxide::Bot,
    config: &WebhookConfig,
    force: bool,
) -> crate::core::Result<WebhookRegistration> {
    let public_url = config.public_url.as_deref().ok_or_else(|| {
        crate::core::WebhookError::StartupConfig("WEBHOOK_PUBLIC_URL not set".to_string())
    })?;
    let url = webhook_url(public_url, &config.webhook_path)?;
    // The Bot API echoes `secret_token` back in a header; with HMAC auth the secret stays local.
    let secret = match config.auth_scheme {
        AuthScheme::SecretToken => Some(config.webhook_secret.as_str()),
        AuthScheme::HmacSha256 => None,
    };
    ensure_webhook(bot, &url, secret, force, &config.retry_policy()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
