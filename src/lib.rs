pub mod clock;
mod commands;
pub mod db;
pub mod geo;
mod host;
pub mod sampler;
pub mod settings;
pub mod store;
pub mod tracking;
mod utils;
pub mod walks;

use std::sync::Arc;

use anyhow::Context;
use clock::{Clock, SystemClock};
use db::Database;
use log::{info, warn};
use sampler::ManualSampler;
use settings::SettingsStore;
use store::SessionStore;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    sync::{broadcast, mpsc},
};
use tracking::{ControllerDeps, WalkTracker};

const NOTICE_CAPACITY: usize = 256;

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) tracker: WalkTracker<Database>,
    pub(crate) settings: SettingsStore,
    pub(crate) manual_sampler: Option<ManualSampler>,
}

impl AppState {
    fn new(db: Database, settings: SettingsStore, clock: Arc<dyn Clock>) -> Self {
        let tracking = settings.tracking();
        let (sampler, manual_sampler) = tracking.build_sampler();
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let tracker = WalkTracker::new(ControllerDeps {
            store: SessionStore::new(db.clone()),
            walks: Arc::new(db.clone()),
            sampler,
            clock,
            config: tracking.tracking_config(),
            notices,
        });

        Self {
            db,
            tracker,
            settings,
            manual_sampler,
        }
    }
}

async fn run_host() -> anyhow::Result<()> {
    let data_dir = settings::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("pawtrail.sqlite3"))?;
    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let state = Arc::new(AppState::new(database, settings_store, Arc::new(SystemClock)));
    info!("Using database at {}", state.db.path().display());

    // Walks cut short by a crash or reload come back before any command runs.
    for pet_id in state.tracker.resume_all().await? {
        warn!("Recovered in-progress walk for pet {pet_id}");
    }
    let active_pet = state.settings.tracking().active_pet_id;
    state.tracker.controller(&active_pet).await?;

    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = output_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let notices = host::forward_notices(&state, output_tx.clone());
    let stdin = BufReader::new(tokio::io::stdin());
    let served = host::serve(state.clone(), stdin, output_tx).await;

    let in_progress = state.tracker.active_pets().await;
    if !in_progress.is_empty() {
        info!("Leaving walks in progress for: {}", in_progress.join(", "));
    }
    state.tracker.shutdown().await;
    notices.abort();
    writer
        .await
        .context("stdout writer task failed")?
        .context("failed to write to stdout")?;
    served
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    let level = if settings::debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    log::info!("PawTrail starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run_host()) {
        log::error!("PawTrail exited with error: {err:#}");
        std::process::exit(1);
    }
}
