//! Binary for the Telegram webhook server.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use telegram_webhook::{
    load_config, register_webhook, run_server, unregister_webhook, Cli, Commands, EchoHandler,
    Handler, NoOpHandler,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { token, port, echo } => {
            let mut config = load_config(token)?;
            if let Some(port) = port {
                config.port = port;
            }
            run_server(config, move |_config, bot| {
                let handler: Arc<dyn Handler> = if echo {
                    Arc::new(EchoHandler::new(bot))
                } else {
                    Arc::new(NoOpHandler::new())
                };
                handler
            })
            .await
        }
        Commands::SetWebhook { token, force } => {
            let outcome = register_webhook(load_config(token)?, force).await?;
            println!("{outcome:?}");
            Ok(())
        }
        Commands::DeleteWebhook { token } => unregister_webhook(load_config(token)?).await,
    }
}
