//! CLI parser and config loading.

use clap::{Parser, Subcommand};

use crate::config::WebhookConfig;
use crate::core::Result;

#[derive(Parser)]
#[command(name = "telegram-webhook")]
#[command(about = "Telegram webhook server: validate, dedup, dispatch", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the webhook endpoint (config from env; token can override BOT_TOKEN).
    Run {
        #[arg(short, long)]
        token: Option<String>,
        /// Overrides PORT.
        #[arg(short, long)]
        port: Option<u16>,
        /// Echo text messages back to their chat instead of only logging updates.
        #[arg(long)]
        echo: bool,
    },
    /// Register WEBHOOK_PUBLIC_URL with the Bot API and exit.
    SetWebhook {
        #[arg(short, long)]
        token: Option<String>,
        /// Call setWebhook even when the URL is already registered (e.g. after rotating the secret).
        #[arg(long)]
        force: bool,
    },
    /// Remove the webhook registration and exit.
    DeleteWebhook {
        #[arg(short, long)]
        token: Option<String>,
    },
}

/// Load WebhookConfig from environment. If `token` is provided it overrides BOT_TOKEN.
pub fn load_config(token: Option<String>) -> Result<WebhookConfig> {
    WebhookConfig::load(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from(["telegram-webhook", "run", "--port", "8080", "--echo"]).unwrap();
        match cli.command {
            Commands::Run { token, port, echo } => {
                assert!(token.is_none());
                assert_eq!(port, Some(8080));
                assert!(echo);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_set_webhook() {
        let cli =
            Cli::try_parse_from(["telegram-webhook", "set-webhook", "-t", "abc", "--force"]).unwrap();
        match cli.command {
            Commands::SetWebhook { token, force } => {
                assert_eq!(token.as_deref(), Some("abc"));
                assert!(force);
            }
            _ => panic!("expected set-webhook"),
        }
    }
}
