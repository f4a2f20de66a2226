//! spinwatch binary
//!
//! Usage:
//!   spinwatch [--config spinwatch.toml] run
//!   spinwatch ingest --values "17, 4, 0, 32"
//!   spinwatch replay --file history.json
//!
//! Environment Variables:
//!   SPINWATCH_CONFIG - Path to TOML config file
//!   SPINWATCH_FEED_URL, SPINWATCH_DB_PATH, SPINWATCH_API_BIND - config overrides
//!   TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID - alert sink
//!   RUST_LOG - log filter (default: spinwatch=info,tower_http=info)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spinwatch::{
    api::{self, AppState},
    engine::EngineState,
    feed::{HttpOutcomeSource, OutcomeSource, ReplayOutcomeSource},
    ingest::parse_values,
    store::OutcomeStore,
    EngineConfig, Intake,
};

#[derive(Parser, Debug)]
#[command(name = "spinwatch")]
#[command(about = "Online outcome prediction and alerting engine")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "SPINWATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the feed and serve the status API (default)
    Run,
    /// Append hand-entered outcomes to the stored history
    Ingest {
        /// Comma or space separated values
        #[arg(short, long)]
        values: String,
    },
    /// Run every cycle against a JSON file of outcomes, in memory, no alerts
    Replay {
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Ingest { values } => ingest(config, &values),
        Command::Replay { file } => replay(config, &file).await,
    }
}

fn load_env() {
    let _ = dotenv();

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let local = manifest_dir.join(".env");
    if local.exists() {
        let _ = dotenv::from_path(&local);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spinwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(config: EngineConfig) -> Result<()> {
    info!("🚀 spinwatch starting");

    let source: Option<Box<dyn OutcomeSource>> = match &config.feed.url {
        Some(url) => Some(Box::new(HttpOutcomeSource::new(url.clone(), config.feed.timeout())?)),
        None => {
            warn!("no feed url configured, running in manual-ingest mode");
            None
        }
    };
    let poll_interval = config.feed.poll_interval();
    let api_config = config.api.clone();

    let engine = EngineState::bootstrap(config)?;
    let state = AppState::new(engine);

    if api_config.enabled {
        let api_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(api_state, &api_config.bind).await {
                warn!(error = %e, "status API stopped");
            }
        });
    }

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = poll_interval.as_secs(), "⏱️ Poll loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(source) = source.as_deref() else {
                    continue;
                };
                let mut engine = state.engine.lock().await;
                let report = engine.run_cycle(source).await;
                state.publish(&engine);
                if report.retrained {
                    info!(history = engine.store().len(), "🧠 Model refreshed this cycle");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown requested");
                break;
            }
        }
    }

    let mut engine = state.engine.lock().await;
    engine
        .shutdown()
        .context("Failed to persist history on shutdown")?;
    info!(outcomes = engine.store().len(), "👋 spinwatch stopped");
    Ok(())
}

fn ingest(config: EngineConfig, raw_values: &str) -> Result<()> {
    let values = parse_values(raw_values)?;
    let mut engine = EngineState::bootstrap(config)?;
    let report = engine.ingest_manual(&values)?;
    engine
        .shutdown()
        .context("Failed to persist ingested outcomes")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn replay(config: EngineConfig, file: &Path) -> Result<()> {
    let source = ReplayOutcomeSource::from_file(file)?;
    let total = source.remaining();
    let mut engine = EngineState::new(config, OutcomeStore::in_memory(), None);

    let mut appended = 0usize;
    while source.remaining() > 0 {
        if let Intake::Appended(_) = engine.run_cycle(&source).await.intake {
            appended += 1;
        }
    }
    info!(total, appended, "📼 Replay finished");

    let snapshot = engine.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot.scoreboard)?);
    Ok(())
}
