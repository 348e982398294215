//! Ticket bot - sells event tickets through a Telegram conversation
//!
//! Collects the buyer's name and phone, hands out a payment link and, once
//! the buyer confirms payment, records the sale in a Google Sheet and
//! notifies the organiser.

mod config;
mod dispatch;
mod presentation;
mod runtime;
mod sheets;
mod state_machine;
mod telegram;

use config::{BotConfig, EventInfo};
use dispatch::Poller;
use presentation::Presentation;
use runtime::{BotApiTransport, OperatorChatNotifier, ProductionServices, RuntimeManager};
use sheets::SheetsLedger;
use std::sync::Arc;
use telegram::TelegramClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticket_bot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = BotConfig::from_env()?;
    let event = EventInfo::default();

    let client = Arc::new(TelegramClient::new(&config.telegram)?);

    // Polling and webhooks are exclusive; stale updates from before the
    // restart are discarded.
    if let Err(e) = client.delete_webhook(true).await {
        tracing::warn!(error = %e, "Failed to clear webhook");
    }
    let me = client.get_me().await?;
    let bot_username = me.username.unwrap_or_default();

    let ledger = SheetsLedger::from_config(&config.sheets)?;

    tracing::info!(
        bot = %bot_username,
        event = %event.name,
        assets = %config.assets_dir.display(),
        operator = config.operator_chat_id,
        "Ticket bot starting"
    );

    let services: ProductionServices = runtime::Services::new(
        BotApiTransport::new(Arc::clone(&client)),
        ledger,
        OperatorChatNotifier::new(Arc::clone(&client)),
        Presentation::new(event, config.assets_dir.clone()),
        config.operator_chat_id,
    );
    let manager = Arc::new(RuntimeManager::new(services));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown requested");
        signal.cancel();
    });

    Poller::new(client, manager, bot_username).run(shutdown).await;

    Ok(())
}
