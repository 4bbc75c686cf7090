//! Run the giveaway bot service.
//!
//! Startup order:
//! 1. Load (or generate) the TOML config and validate it — invalid
//!    configuration aborts before anything connects
//! 2. Open the state store
//! 3. Wire the Discord gateway to the session's event loop
//! 4. Connect; the session resumes any persisted countdown on ready

use super::config::{default_config_path, HoldoutConfig};
use holdout::chat::discord::{required_intents, DiscordGateway, EventTranslator};
use holdout::giveaway::GiveawaySession;
use holdout::store::StateStore;
use serenity::all::Http;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        HoldoutConfig::create_default(&config_path)?;
        println!("📝 No config file found. Created default configuration:");
        println!("   {}", config_path.display());
        println!("   Fill in the [discord] ids and run again.");
        return Ok(());
    }

    let config = HoldoutConfig::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Fatal on missing ids / malformed quiet window
    let giveaway = config.giveaway_config()?;

    let token = std::env::var("DISCORD_TOKEN")
        .map_err(|_| "DISCORD_TOKEN environment variable is required")?;

    println!("🚀 Starting holdout giveaway bot...");
    println!("Config: {}", config_path.display());
    println!("Store:  {}", config.storage.db_path.display());

    let store = StateStore::open(&config.storage.db_path).await?;

    let gateway = DiscordGateway::new(Arc::new(Http::new(&token)), config.discord.guild_id);
    let (events_tx, events_rx) = mpsc::channel(256);

    let session = GiveawaySession::new(gateway.clone(), store, giveaway);
    let session_loop = session.clone();
    tokio::spawn(async move {
        session_loop.run(events_rx).await;
    });

    let handler = EventTranslator::new(gateway, events_tx);
    let mut client = serenity::Client::builder(&token, required_intents())
        .event_handler(handler)
        .await?;
    client.start().await?;

    Ok(())
}
