//! Command-line runner for AI party adventures.
//!
//! ```bash
//! cargo run -p dnd -- play --rounds 3
//! cargo run -p dnd -- play --mode deliberate --human Brussae
//! cargo run -p dnd -- saves
//! ```

mod cli;
mod console;

use anyhow::{Context, Result};
use clap::Parser;
use dnd_core::persist::list_saves;
use dnd_core::{frontend, GameConfig, GameError, GameMaster, GameStore, JsonFileStore, Scenario};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dnd=info,dnd_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = GameConfig::from_env().context("invalid configuration")?;
    if let Some(dir) = cli.save_dir {
        config = config.with_save_dir(dir);
    }

    match cli.command {
        Commands::Play {
            rounds,
            scenario,
            load,
            mode,
            seed,
            humans,
            round_saves,
        } => {
            if let Some(mode) = mode {
                config = config.with_turn_mode(mode.into());
            }
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }
            let rounds = rounds.unwrap_or(config.default_rounds);
            let store = JsonFileStore::new(&config.save_dir).with_round_saves(round_saves);
            play(config, store, rounds, scenario, load, humans).await
        }
        Commands::Saves => {
            let saves = list_saves(&config.save_dir)
                .await
                .with_context(|| format!("cannot read {}", config.save_dir.display()))?;
            if saves.is_empty() {
                println!("No saves in {}", config.save_dir.display());
            }
            for save in saves {
                let meta = save.metadata;
                println!(
                    "{}  round {:>3}  {} players  {}  ({})",
                    meta.saved_at,
                    meta.round,
                    meta.player_count,
                    meta.campaign,
                    save.path.display()
                );
            }
            Ok(())
        }
        Commands::Summary { campaign } => {
            let saved = JsonFileStore::new(&config.save_dir)
                .load(&campaign)
                .await
                .with_context(|| format!("cannot load campaign '{campaign}'"))?;
            println!("{}", saved.state.summary());
            Ok(())
        }
    }
}

async fn play(
    config: GameConfig,
    store: JsonFileStore,
    rounds: u32,
    scenario: Option<std::path::PathBuf>,
    load: Option<String>,
    humans: Vec<String>,
) -> Result<()> {
    let generator = Arc::new(claude::Claude::new(config.require_api_key()?)?);

    let mut game = match load {
        Some(campaign) => {
            let saved = store
                .load(&campaign)
                .await
                .with_context(|| format!("cannot load campaign '{campaign}'"))?;
            tracing::info!(%campaign, round = saved.state.round, "resuming");
            GameMaster::from_save(config, saved, generator)?
        }
        None => {
            let scenario = match scenario {
                Some(path) => Scenario::load(&path)
                    .await
                    .with_context(|| format!("cannot load scenario {}", path.display()))?,
                None => Scenario::crimson_crypt(),
            };
            GameMaster::new(config, scenario.into_state(), generator)?
        }
    };

    let (frontend, client) = frontend::channel(64);
    let console = console::spawn(client);
    game = game.with_store(store).with_frontend(frontend);
    for name in &humans {
        game = game.with_human_seat(name)?;
    }

    let abort = game.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping before the next model call");
            abort.abort();
        }
    });

    println!("=== {} ===\n\n{}\n", game.state().campaign, game.state().scene);

    let outcome = game.run(rounds).await;
    if !game.config().auto_save {
        if let Some(location) = game.save().await? {
            tracing::info!(%location, "game saved");
        }
    }
    println!("{}", game.summary());

    // Closing the front-end ends the console task.
    drop(game);
    let _ = console.await;

    match outcome {
        Ok(()) | Err(GameError::Aborted) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
