use std::sync::Arc;

use dotenv::dotenv;
use serenity::prelude::*;
use serenity::Client as DiscordClient;
use tracing::info;

use Ticketry::{
    alert::App,
    collector::PendingWaits,
    config::Config,
    handler::Handler,
    report::FileReporter,
    store::JsonStore,
    tickets::Tickets,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cfg = Config::load()?;

    let store = Arc::new(JsonStore::open(cfg.settings.store_file()).await?);
    let reporter = Arc::new(FileReporter::new(cfg.settings.log_file()));
    let app = App {
        settings: Arc::new(cfg.settings.clone()),
        store: store.clone(),
        tickets: Tickets::new(store),
        waits: Arc::new(PendingWaits::new()),
        reporter,
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    info!("Starting ticket bot...");
    let mut client = DiscordClient::builder(&cfg.discord_token, intents)
        .event_handler(Handler { guild_id: cfg.guild_id, app })
        .await
        .expect("Error creating Discord client");

    if let Err(err) = client.start().await {
        eprintln!("Client error: {err:?}");
    }
    Ok(())
}
