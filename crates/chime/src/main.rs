//! # chime
//!
//! Agent-creation server binary. Wires the collaborator clients, the
//! pipeline, and the HTTP/WebSocket server together.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chime_pipeline::pipeline::{AgentCreationPipeline, PipelineConfig};
use chime_pipeline::progress_manager::ProgressManager;
use chime_pipeline::progress_tracker::{ProgressBroadcaster, ProgressTracker};
use chime_server::{AppState, WebSocketManager, router};
use chime_services::crawler::HttpWebCrawler;
use chime_services::knowledge::StandardKnowledgeService;
use chime_services::phone::TwilioPhoneClient;
use chime_services::selection::Collaborators;
use chime_services::settings::{ChimeSettings, init_settings, load_settings_from_path};
use chime_services::store::SqliteAgentStore;
use chime_services::voice::ElevenLabsVoiceClient;

/// How often completed progress sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Chime agent-creation server.
#[derive(Parser, Debug)]
#[command(name = "chime", about = "Agent-creation server")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings if specified).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file.
    #[arg(long, default_value = "chime.json")]
    config: PathBuf,

    /// Path to the `SQLite` agent database (overrides settings if specified).
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("CHIME_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build the candidate collaborator bundle from settings.
///
/// Clients with missing credentials are constructed anyway; their probe
/// fails with `NotConfigured` and selection swaps in the mock.
fn build_candidates(settings: &ChimeSettings, db_path: &Path) -> Result<Collaborators> {
    let http = reqwest::Client::new();
    let store = SqliteAgentStore::open(db_path)
        .with_context(|| format!("failed to open agent store at {}", db_path.display()))?;
    Ok(Collaborators {
        web_crawler: Arc::new(HttpWebCrawler::new(http.clone(), settings.crawler.max_pages)),
        knowledge: Arc::new(StandardKnowledgeService),
        voice: Arc::new(ElevenLabsVoiceClient::new(
            http.clone(),
            settings.voice.base_url.clone(),
            settings.voice.api_key.clone().unwrap_or_default(),
        )),
        phone: Arc::new(TwilioPhoneClient::new(
            http,
            settings.phone.base_url.clone(),
            settings.phone.account_sid.clone().unwrap_or_default(),
            settings.phone.auth_token.clone().unwrap_or_default(),
        )),
        store: Arc::new(store),
    })
}

fn pipeline_config(settings: &ChimeSettings) -> PipelineConfig {
    PipelineConfig {
        budget: Duration::from_secs(settings.pipeline.budget_secs),
        warning_threshold: Duration::from_secs(settings.pipeline.warning_threshold_secs),
        min_confidence: settings.pipeline.min_confidence,
        max_kb_bytes: settings.pipeline.max_kb_bytes,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Settings are loaded before logging so a bad file fails loudly on
    // stderr rather than into a half-configured subscriber.
    let settings = load_settings_from_path(&args.config)
        .with_context(|| format!("failed to parse settings file {}", args.config.display()))?;
    init_logging();
    init_settings(settings.clone());

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let db_path = args
        .db_path
        .unwrap_or_else(|| PathBuf::from(&settings.store.db_path));
    let candidates = build_candidates(&settings, &db_path)?;

    let progress = Arc::new(ProgressManager::new());
    let manager = Arc::new(WebSocketManager::new());
    let tracker = ProgressTracker::new(
        Arc::clone(&progress),
        Arc::clone(&manager) as Arc<dyn ProgressBroadcaster>,
    );
    let pipeline = Arc::new(
        AgentCreationPipeline::new(candidates, pipeline_config(&settings), tracker).await,
    );

    let status = pipeline.get_service_status();
    info!(
        mode = status.pipeline_mode,
        db_path = %db_path.display(),
        "collaborators selected"
    );

    // Periodic sweep of completed progress sessions past their TTL.
    let session_ttl = chrono::Duration::hours(settings.pipeline.session_ttl_hours as i64);
    let sweep_progress = Arc::clone(&progress);
    drop(tokio::spawn(async move {
        let mut tick = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            let _ = tick.tick().await;
            let removed = sweep_progress.cleanup_old_sessions(session_ttl);
            if removed > 0 {
                info!(removed, "swept completed sessions");
            }
        }
    }));

    let state = AppState::new(pipeline, Arc::clone(&manager), Arc::clone(&progress));
    let app = router(state).route(
        "/metrics",
        get(move || std::future::ready(metrics_handle.render())),
    );

    let host = args.host.unwrap_or_else(|| settings.server.host.clone());
    let port = args.port.unwrap_or(settings.server.port);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    info!(addr = %listener.local_addr()?, "chime listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}
