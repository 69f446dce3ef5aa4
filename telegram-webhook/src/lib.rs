//! # Telegram webhook server
//!
//! Receives Telegram updates over HTTP, authenticates them, suppresses redeliveries with a dedup
//! ledger and runs handlers on a bounded worker pool with retries and dead-lettering. The webhook
//! caller is acknowledged as soon as the update is queued.

pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod endpoint;
pub mod handlers;
pub mod ledger;
pub mod runner;
pub mod telegram;
pub mod validator;

pub use cli::{load_config, Cli, Commands};

pub use crate::core::{init_tracing, Bot, Handler, HandlerError, InboundUpdate, Result, WebhookError};

pub use config::WebhookConfig;
pub use dispatch::{
    DeadLetter, DeadLetterSink, DispatchConfig, DispatchQueue, DispatchTask, JsonlDeadLetterSink,
    QueueStats, RetryPolicy, TracingDeadLetterSink,
};
pub use endpoint::{router, Ack, WebhookEndpoint};
pub use handlers::{EchoHandler, NoOpHandler};
pub use ledger::DedupLedger;
pub use runner::{build_endpoint, register_webhook, run_server, serve, unregister_webhook};
pub use telegram::{TelegramBotAdapter, WebhookRegistration};
pub use validator::{AuthScheme, UpdateValidator};
