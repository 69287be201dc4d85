//! ctv-mc (Music Cue) - phase music trigger service for Circuit TV
//!
//! Serves the trigger editor and the live TV display:
//! - round phases, music configuration and track candidates for editors
//! - per-phase evaluation and playback cues for the display
//! - an SSE stream of configuration changes

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ctv_common::config::{default_config_file, RootFolderInitializer, RootFolderResolver, TomlConfig};
use ctv_common::events::EventBus;
use ctv_mc::library::catalog::{import_catalog, SeedCatalog};
use ctv_mc::library::SqliteTrackLibrary;
use ctv_mc::persistence::SqliteMusicConfigGateway;
use ctv_mc::template::TemplateStore;
use ctv_mc::{build_router, AppState, MusicCueService};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 5760;
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for ctv-mc
#[derive(Parser, Debug)]
#[command(name = "ctv-mc")]
#[command(about = "Music cue service for Circuit TV workouts")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "CTV_MC_PORT")]
    port: Option<u16>,

    /// Root folder holding ctv.db
    #[arg(short, long, env = "CTV_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON track catalog to import before serving
    #[arg(long)]
    seed_library: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_file);
    let toml_config = TomlConfig::load_or_default(config_path.as_deref());

    let default_filter = format!(
        "ctv_mc={level},ctv_common={level},tower_http={level}",
        level = toml_config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any database work
    info!(
        "Starting Circuit TV Music Cue (ctv-mc) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let engine = toml_config.engine.clone();
    info!(
        "Engine: transition buffer {}s, high countdown {}ms",
        engine.transition_buffer_secs, engine.high_countdown_ms
    );

    // CLI > env > TOML > compiled default
    let root_folder = RootFolderResolver::new("music-cue")
        .with_cli_arg(args.root_folder.clone())
        .with_toml(toml_config)
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match ctv_common::db::init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let library = SqliteTrackLibrary::new(pool.clone());
    let templates = TemplateStore::new(pool.clone());

    if let Some(seed) = &args.seed_library {
        let catalog = SeedCatalog::load(seed)
            .with_context(|| format!("Failed to read seed catalog {}", seed.display()))?;
        let summary = import_catalog(&catalog, &library, &templates)
            .await
            .context("Failed to import seed catalog")?;
        info!(
            "✓ Seeded {} tracks and {} rounds from {}",
            summary.tracks,
            summary.rounds,
            seed.display()
        );
    }

    let service = MusicCueService::new(
        Arc::new(library),
        templates,
        Arc::new(SqliteMusicConfigGateway::new(pool)),
        EventBus::new(EVENT_BUS_CAPACITY),
        &engine,
    );
    let app = build_router(AppState::new(service));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("ctv-mc listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
