// Paddock entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Build the draft service: in-process SQLite server or HTTP
// 4. Spawn the session loop
// 5. Run the TUI until the user quits
// 6. Wait briefly for the session to tear down

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use paddock_app::http::HttpDraftService;
use paddock_app::session::{self, SessionSettings};
use paddock_core::config::{self, Config, ServerMode};
use paddock_core::db::Database;
use paddock_core::local::LocalDraftServer;
use paddock_core::seed;
use paddock_core::service::DraftService;
use paddock_tui::tui;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Paddock starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league {} ({}), race {}, {} draft, {} slots per team",
        config.league.name,
        config.league.id,
        config.league.race_id,
        config.draft.method.as_str(),
        config.league.draftable_slots_per_team
    );

    let service = build_service(&config)?;
    let settings = SessionSettings::from_config(&config);

    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let session_handle = tokio::spawn(async move {
        if let Err(e) = session::run(service, settings, cmd_rx, ui_tx).await {
            error!("Session loop error: {}", e);
        }
    });

    if let Err(e) = tui::run(ui_rx, cmd_tx).await {
        error!("TUI error: {}", e);
    }

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = session_handle.await;
    })
    .await;

    info!("Paddock shut down cleanly");
    Ok(())
}

fn build_service(config: &Config) -> anyhow::Result<Arc<dyn DraftService>> {
    let key = config.draft_key();
    match config.server.mode {
        ServerMode::Local => {
            let db = Database::open(&config.db_path).context("failed to open database")?;
            info!("Database opened at {}", config.db_path);

            let server = LocalDraftServer::new(
                db,
                key,
                config.league.team_refs(),
                config.league.draftable_slots_per_team,
                Duration::from_secs(u64::from(config.draft.turn_seconds)),
            )
            .context("failed to start local draft server")?;

            let drivers = seed::load_drivers(Path::new(&config.data_paths.drivers))
                .context("failed to load driver seed data")?;
            let stored = server
                .seed_drivers(&drivers)
                .context("failed to store drivers")?;
            info!("Local draft server ready for {} ({} drivers)", key, stored);
            Ok(Arc::new(server))
        }
        ServerMode::Http => {
            let service = HttpDraftService::new(
                &config.server.base_url,
                key,
                config.credentials.api_token.clone(),
                Duration::from_secs(config.reconcile.fetch_timeout_secs),
            )?;
            info!("Using draft server at {} for {}", config.server.base_url, key);
            Ok(Arc::new(service))
        }
    }
}

/// Initialize tracing to log to a file (not the terminal, which is used by the TUI).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("paddock.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("paddock=info,warn")),
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
