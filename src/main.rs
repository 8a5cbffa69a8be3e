use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use match_tracker::api::{build_router, state::AppState};
use match_tracker::calculate::summarize_player;
use match_tracker::config::AppConfig;
use match_tracker::coordinator::MatchCacheCoordinator;
use match_tracker::models::{MatchRecord, RiotId};
use match_tracker::source::RiotClient;
use match_tracker::storage::{open_store, StorageConfig};

#[derive(Parser)]
#[command(name = "match-tracker")]
#[command(about = "Incremental League of Legends match history cache")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Data directory path (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port number (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Refresh one player's matches and print them
    Fetch {
        /// Riot id as Name#TAG
        #[arg(long)]
        player: RiotId,

        /// Recent upstream matches to consider
        #[arg(long)]
        count: Option<u32>,
    },

    /// Print cache statistics and a summary from cached matches
    Stats {
        /// Riot id as Name#TAG
        #[arg(long)]
        player: RiotId,
    },

    /// Delete one player's cached matches
    Clear {
        /// Riot id as Name#TAG
        #[arg(long)]
        player: RiotId,
    },

    /// Refresh every configured player in turn
    SyncAll {
        /// Recent upstream matches to consider per player
        #[arg(long)]
        count: Option<u32>,
    },
}

fn build_coordinator(config: &AppConfig) -> Result<MatchCacheCoordinator> {
    let client_config = config
        .riot
        .client_config()
        .context("Failed to configure Riot API client")?;
    let client = Arc::new(RiotClient::new(client_config)?);

    let storage = StorageConfig::new(config.data_dir.clone());
    let store = open_store(config.cache.backend, &storage);
    tracing::info!(
        "Using {} store under {}",
        store.name(),
        config.data_dir.display()
    );

    Ok(MatchCacheCoordinator::new(
        client.clone(),
        client,
        store,
        config.cache.coordinator_config(),
    ))
}

fn print_matches(riot_id: &RiotId, records: &[MatchRecord]) {
    println!("\n=== {} ({} matches) ===", riot_id, records.len());
    println!(
        "{:<18} {:<17} {:<14} {:>9} {:>4}",
        "Match", "Played", "Champion", "K/D/A", "W/L"
    );

    for record in records {
        let played = record
            .created_at()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let line = record
            .info
            .participants
            .iter()
            .find(|p| p.riot_id_game_name == riot_id.game_name);

        match line {
            Some(p) => println!(
                "{:<18} {:<17} {:<14} {:>9} {:>4}",
                record.id().as_str(),
                played,
                p.champion_name,
                format!("{}/{}/{}", p.kills, p.deaths, p.assists),
                if p.win { "W" } else { "L" }
            ),
            None => println!("{:<18} {:<17}", record.id().as_str(), played),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    let (plain, json) = if cli.json_logs {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();

    tracing::info!("Starting match-tracker v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    match cli.command {
        Commands::Serve { host, port } => {
            let coordinator = build_coordinator(&config)?;
            let players = config.players.iter().map(|p| p.riot_id()).collect();
            let state = AppState::new(coordinator, players)
                .with_cors_origin(config.server.cors_origin.clone());

            let app = build_router(state);
            let addr = format!(
                "{}:{}",
                host.unwrap_or(config.server.host),
                port.unwrap_or(config.server.port)
            );
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Listening on http://{}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Fetch { player, count } => {
            let coordinator = build_coordinator(&config)?;
            let count = count.unwrap_or(coordinator.config().default_count);

            let key = coordinator.resolve(&player).await?;
            let report = coordinator.sync_player(&key, count).await?;

            print_matches(&player, &report.records);
            println!(
                "\nNew: {}  Persisted: {}  Stale: {}",
                report.new_ids.len(),
                report.persisted,
                report.stale
            );
        }
        Commands::Stats { player } => {
            let coordinator = build_coordinator(&config)?;
            let key = coordinator.resolve(&player).await?;
            let state = coordinator.store().load(&key).await?;
            let stats = state.stats();
            let summary = summarize_player(state.records(), &player.game_name);

            println!("\n=== {} ===", player);
            println!("Player key:       {}", key);
            println!("Cached matches:   {}", stats.count);
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                println!("Range:            {} .. {}", oldest, newest);
            }
            if let Some(updated) = stats.last_updated {
                println!("Last updated:     {}", updated);
            }
            println!(
                "Record:           {}W {}L ({:.1}%)",
                summary.wins,
                summary.games - summary.wins,
                summary.win_rate * 100.0
            );
            println!(
                "KDA:              {:.2} ({}/{}/{}) grade {:?}",
                summary.kda, summary.kills, summary.deaths, summary.assists, summary.grade
            );
            println!("CS/min:           {:.1}", summary.cs_per_min);
            println!("Gold/min:         {:.0}", summary.gold_per_min);
        }
        Commands::Clear { player } => {
            let coordinator = build_coordinator(&config)?;
            let key = coordinator.resolve(&player).await?;
            if coordinator.clear(&key).await? {
                println!("Cleared cache for {}", player);
            } else {
                println!("No cache for {}", player);
            }
        }
        Commands::SyncAll { count } => {
            if config.players.is_empty() {
                eprintln!("No players configured in {}", cli.config.display());
                return Ok(());
            }

            let coordinator = build_coordinator(&config)?;
            let count = count.unwrap_or(coordinator.config().default_count);
            let mut failures = 0;

            for entry in &config.players {
                let riot_id = entry.riot_id();
                let result = match coordinator.resolve(&riot_id).await {
                    Ok(key) => coordinator.sync_player(&key, count).await,
                    Err(e) => Err(e),
                };

                match result {
                    Ok(report) => tracing::info!(
                        "{}: {} matches ({} new, stale: {})",
                        riot_id,
                        report.records.len(),
                        report.new_ids.len(),
                        report.stale
                    ),
                    Err(e) => {
                        failures += 1;
                        tracing::error!("{} failed at {} stage: {}", riot_id, e.stage(), e);
                    }
                }
            }

            println!(
                "Synced {} of {} players",
                config.players.len() - failures,
                config.players.len()
            );
        }
    }

    Ok(())
}
