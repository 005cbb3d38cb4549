//! vdas-ai: vehicle damage assessment service
//!
//! Startup order: bootstrap config → logging → database → object storage →
//! inference client → orchestrator → retention sweeper → HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vdas_ai::config::{resolve_allowed_origins, AssessmentSettings, InferenceSettings};
use vdas_ai::db::{self, AssessmentStore};
use vdas_ai::services::retention::spawn_retention_sweeper;
use vdas_ai::services::{
    AssessmentOrchestrator, DamageDetector, HostedInferenceClient, LocalObjectStorage,
    ObjectStorage,
};
use vdas_ai::{build_router, AppState};
use vdas_common::config::{
    default_config_path, ensure_root_folder, load_toml_config, resolve_root_folder,
};

const DEFAULT_PORT: u16 = 5730;

#[derive(Parser, Debug)]
#[command(name = "vdas-ai")]
#[command(about = "Vehicle damage assessment service")]
#[command(version)]
struct Args {
    /// HTTP port (overrides TOML)
    #[arg(short, long, env = "VDAS_AI_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and stored images
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML bootstrap config path
    #[arg(short, long, env = "VDAS_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL the inference provider uses to fetch stored images
    #[arg(long, env = "VDAS_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Inference API key (highest priority)
    #[arg(long)]
    inference_api_key: Option<String>,

    /// Comma-separated browser origins allowed by CORS (overrides TOML)
    #[arg(long, env = "VDAS_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path("vdas-ai"))
        .unwrap_or_else(|| PathBuf::from("vdas-ai.toml"));
    let toml_config = load_toml_config(&config_path)?;

    let default_filter = format!(
        "vdas_ai={level},vdas_common={level},tower_http={level}",
        level = toml_config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    info!("Starting vdas-ai on port {}", port);

    let root_folder =
        resolve_root_folder(args.root_folder.as_deref(), "VDAS_ROOT_FOLDER", &toml_config);
    let db_path = ensure_root_folder(&root_folder)?;
    info!("Root folder: {}", root_folder.display());

    let settings = AssessmentSettings::from_toml(&toml_config.assessment)?;
    let inference = InferenceSettings::resolve(args.inference_api_key.as_deref(), &toml_config)?;

    let pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database ready: {}", db_path.display());
    let store = AssessmentStore::new(pool, settings.retention);

    let public_base_url = args
        .public_base_url
        .or_else(|| toml_config.public_base_url.clone())
        .unwrap_or_else(|| format!("http://localhost:{}", port));
    let objects_dir = root_folder.join("objects");
    let storage: Arc<dyn ObjectStorage> =
        Arc::new(LocalObjectStorage::new(&objects_dir, &public_base_url));
    info!("Serving stored images at {}/objects", public_base_url);

    let client = HostedInferenceClient::new(
        &inference.api_url,
        &inference.api_key,
        inference.requests_per_second,
    )
    .context("Failed to build inference client")?;
    info!(
        damage_models = ?inference.models.damage_models,
        severity_model = %inference.models.severity_model,
        "Inference provider: {}",
        inference.api_url
    );
    let detector = Arc::new(DamageDetector::new(
        Arc::new(client),
        inference.models,
        settings.fusion,
    ));

    let sweep_interval = settings
        .sweep_interval
        .to_std()
        .context("Invalid sweep interval")?;
    let orchestrator =
        AssessmentOrchestrator::new(store.clone(), storage.clone(), detector, settings);

    spawn_retention_sweeper(store, storage.clone(), sweep_interval);

    let allowed_origins = resolve_allowed_origins(&args.allowed_origins, &toml_config);
    info!("CORS allowed origins: {:?}", allowed_origins);
    let app = build_router(
        AppState::new(orchestrator, storage, objects_dir).with_allowed_origins(allowed_origins),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
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
