mod clock;
mod commands;
mod communication_channel;
mod config;
mod conversation_manager;
mod discord_manager;
mod error;
mod generator;
mod punctuation;
mod selection;
mod text;
mod timing;


use std::env;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use dotenvy::dotenv;
use serenity::client::Client;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::clock::TokioClock;
use crate::config::{discover_bots, BotSettings, ConfigStore, JsonFileStore, SharedConfig};
use crate::conversation_manager::ConversationScheduler;
use crate::discord_manager::{build_client, Handler};
use crate::generator::CorpusGenerator;
use crate::timing::TimingModel;

const CONFIG_ROOT: &str = "./config";
/// Fixes the random source, for reproducible pacing.
const SEED_ENV: &str = "MIMICBOT_SEED";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn timing_model(index: u32) -> TimingModel {
    match env::var(SEED_ENV).ok().and_then(|s| s.parse::<u64>().ok()) {
        Some(seed) => TimingModel::seeded(seed.wrapping_add(u64::from(index))),
        None => TimingModel::new(),
    }
}

async fn create_bot(settings: &BotSettings) -> Result<Client, Box<dyn Error>> {
    let bot_name = format!("bot{}", settings.index);

    let store = JsonFileStore::new(settings.config_path());
    let configuration = store.load()?;
    let config = Arc::new(SharedConfig::new(configuration, Box::new(store)));

    let generator = CorpusGenerator::from_file(&settings.corpus_path())?;
    if generator.is_empty() {
        warn!(bot = %bot_name, path = %settings.corpus_path().display(), "corpus is empty");
    }

    let scheduler = Arc::new(ConversationScheduler::new(
        bot_name,
        Arc::clone(&config),
        Arc::new(generator),
        Arc::new(TokioClock::new()),
        timing_model(settings.index),
    ));

    let handler = Handler::new(settings.command_prefix.clone(), config, scheduler);
    Ok(build_client(&settings.token, handler).await?)
}

#[tokio::main]
async fn main() {
    let dotenv_loaded = dotenv().is_ok();
    init_tracing();
    if !dotenv_loaded {
        warn!(".env file not found");
    }

    let bots = match discover_bots(Path::new(CONFIG_ROOT)) {
        Ok(bots) => bots,
        Err(why) => {
            error!(error = %why, "failed to read bot settings");
            return;
        }
    };
    if bots.is_empty() {
        error!(root = CONFIG_ROOT, "no bot config directories found");
        return;
    }

    let mut running = Vec::new();
    for settings in &bots {
        match create_bot(settings).await {
            Ok(mut client) => {
                info!(index = settings.index, prefix = %settings.command_prefix, "starting bot");
                running.push(tokio::spawn(async move {
                    if let Err(why) = client.start().await {
                        error!(error = ?why, "an error occurred while running the client");
                    }
                }));
            }
            Err(why) => error!(index = settings.index, error = %why, "failed to initialize bot"),
        }
    }

    for handle in running {
        if let Err(why) = handle.await {
            error!(error = %why, "bot task panicked");
        }
    }
}
