// Draft engine entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database
// 4. Load the player roster
// 5. Create (or resume) the draft
// 6. Wire the scheduler, trigger, and engine
// 7. Run the engine loop until the draft completes or Ctrl+C

use draft_engine::config;
use draft_engine::db::SqliteDraftStore;
use draft_engine::draft::roster;
use draft_engine::engine::DraftEngine;
use draft_engine::scheduler::TokioScheduler;
use draft_engine::store::{DraftStateStore, StoreError};
use draft_engine::trigger::DraftTimerTrigger;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

const DRAFT_ID: &str = "live";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file)
    init_tracing()?;
    info!("Draft engine starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} rounds, {}s pick limit",
        config.draft.num_rounds, config.draft.pick_time_limit_secs
    );

    // 3. Open database
    let store = Arc::new(
        SqliteDraftStore::open(&config.database.path).context("failed to open database")?,
    );
    info!("Database opened at {}", config.database.path);

    // 4. Load the player roster
    let players =
        roster::load_roster(Path::new(&config.data.roster)).context("failed to load roster")?;
    info!("Loaded {} players from {}", players.len(), config.data.roster);

    // 5. Wire the scheduler, trigger, and engine
    let (fired_tx, fired_rx) = mpsc::channel(256);
    let scheduler = Arc::new(TokioScheduler::new(fired_tx));
    let trigger = Arc::new(DraftTimerTrigger::new(
        store.clone(),
        scheduler,
        store.clone(),
        config.draft.clone(),
    ));
    let engine = DraftEngine::new(store.clone(), trigger, config);

    // 6. Create the draft, or resume one left by a previous run
    match store.get(DRAFT_ID).await {
        Ok(existing) => {
            info!(
                "Resuming draft at pick {} of {}",
                existing.state.current_pick_index,
                existing.state.pick_order.len()
            );
        }
        Err(StoreError::NotFound(_)) => {
            let (_, warnings) = engine
                .create_draft(DRAFT_ID, players)
                .await
                .context("failed to create draft")?;
            for warning in warnings {
                eprintln!("warning: {warning}");
            }
            info!("Created new draft `{DRAFT_ID}`");
        }
        Err(e) => return Err(e).context("failed to load draft"),
    }

    // 7. Run until the draft completes or Ctrl+C
    tokio::select! {
        result = engine.run(DRAFT_ID, fired_rx) => {
            if let Err(e) = result {
                error!("Engine loop error: {e}");
                return Err(e.into());
            }
            info!("Draft complete");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted; shutting down");
        }
    }

    info!("Draft engine shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("draft-engine.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("draft_engine=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
