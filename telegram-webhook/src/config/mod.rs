//! Server configuration loaded from env.

mod webhook_config;


pub use webhook_config::WebhookConfig;
