// League server entry point.
//
// Startup sequence:
// 1. Parse the command line and initialize tracing
// 2. Seed config/ from defaults/ and load config/league.toml
// 3. Open the database and build the League
// 4. Run the requested command (`run` spawns the scheduler and dispatcher
//    and waits for Ctrl+C)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ftt_app::cli::{Cli, Commands};
use ftt_app::dispatch::{Dispatcher, LogSink};
use ftt_app::scheduler::AutoDraftScheduler;
use ftt_core::config::{self, Config};
use ftt_core::db::Database;
use ftt_core::time::SystemClock;
use ftt_core::League;
use serde::Serialize;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let config = load_config(&cli.base_dir)?;
    info!(
        "Config loaded: league={}, cap {:.2}, {}-{} players",
        config.league.name, config.league.salary_cap, config.league.min_players, config.league.max_players
    );

    if let Some(dir) = Path::new(&config.db_path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create database directory {}", dir.display()))?;
    }
    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);
    let league = Arc::new(
        League::new(db, config.clone(), Arc::new(SystemClock)).context("invalid league configuration")?,
    );

    match cli.command {
        Commands::Run => run(league, &config).await?,
        Commands::StartDraft { draft } => {
            let order = league
                .start_draft(draft)
                .with_context(|| format!("failed to start draft {draft}"))?;
            print_json(&order)?;
        }
        Commands::Pick { position, player } => {
            let outcome = league
                .make_pick(position, player)
                .with_context(|| format!("failed to pick for position {position}"))?;
            print_json(&outcome)?;
        }
        Commands::Vote {
            trade,
            user,
            vote,
            notes,
        } => {
            let outcome = league
                .record_vote(trade, user, vote.into(), &notes)
                .with_context(|| format!("failed to record vote on trade {trade}"))?;
            print_json(&outcome)?;
        }
        Commands::ExecuteTrade { trade } => {
            let trade = league
                .execute_trade(trade)
                .with_context(|| format!("failed to execute trade {trade}"))?;
            print_json(&trade)?;
        }
        Commands::Board { draft } => {
            let board = league
                .draft_board(draft)
                .with_context(|| format!("failed to load board for draft {draft}"))?;
            for entry in &board {
                let marker = if entry.is_current { ">" } else { " " };
                let team = entry.team_id.map_or_else(|| "-".to_string(), |t| t.to_string());
                let pick = match (&entry.player_name, entry.is_auto_pick) {
                    (Some(name), true) => format!("{name} (auto)"),
                    (Some(name), false) => name.clone(),
                    (None, _) => String::new(),
                };
                println!(
                    "{marker} {:>3}  R{}.{:<2}  team {:<4} {}",
                    entry.overall_pick, entry.round, entry.round_pick, team, pick
                );
            }
        }
        Commands::ProcessExpired => {
            let outcomes = league
                .process_expired_picks()
                .context("failed to process expired picks")?;
            info!("Auto-picked {} expired clocks", outcomes.len());
            print_json(&outcomes)?;
        }
    }
    Ok(())
}

async fn run(league: Arc<League>, config: &Config) -> anyhow::Result<()> {
    let scheduler = AutoDraftScheduler::new(league.clone(), config.scheduler.clone()).spawn();
    let dispatcher = Dispatcher::new(
        league,
        Arc::new(LogSink),
        config.scheduler.dispatch_batch,
        Duration::from_secs(config.scheduler.dispatch_interval_secs),
    )
    .spawn();
    info!("League workers running; press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutdown requested");

    scheduler.shutdown().await;
    dispatcher.shutdown().await;
    info!("League workers stopped cleanly");
    Ok(())
}

fn load_config(base_dir: &Path) -> anyhow::Result<Config> {
    let copied = config::ensure_config_files(base_dir).context("failed to seed configuration")?;
    for path in &copied {
        info!("Created {} from defaults", path.display());
    }
    config::load_config_from(base_dir).context("failed to load configuration")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing to stderr, or to `log_file` when given.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ftt_core=info,ftt_app=info,warn"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            tracing::subscriber::set_global_default(
                builder.with_writer(file).with_ansi(false).finish(),
            )
            .context("failed to set tracing subscriber")?;
        }
        None => {
            tracing::subscriber::set_global_default(
                builder.with_writer(std::io::stderr).finish(),
            )
            .context("failed to set tracing subscriber")?;
        }
    }
    Ok(())
}
