mod analysis;
mod auth;
mod config;
mod db;
mod errors;
mod inference;
mod models;
mod payments;
mod routes;
mod state;
mod storage;
mod store;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::inference::gradio::GradioClient;
use crate::payments::gateway::PaymentGateway;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::{sweeper::spawn_sweeper, BlobStore, LocalBlobStore, S3BlobStore};
use crate::store::{MemoryStore, PgStore, Store};

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resify API v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(PgStore::new(create_pool(url).await?)),
        None => {
            info!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let blobs: Arc<dyn BlobStore> = match &config.s3 {
        Some(s3) => Arc::new(S3BlobStore::new(s3).await),
        None => Arc::new(LocalBlobStore::new(&config.upload_dir).await?),
    };
    info!("Blob store initialized ({})", blobs.kind());

    let model = GradioClient::new(
        &config.inference_base_url,
        config.hf_token.clone(),
        Duration::from_secs(config.inference_timeout_secs),
        config.max_pdf_bytes,
    )?;
    info!("Inference client initialized ({})", config.inference_base_url);

    let gateway = PaymentGateway::new(
        config.razorpay_key_id.clone(),
        &config.razorpay_key_secret,
    );

    let sweeper = spawn_sweeper(
        blobs.clone(),
        chrono::Duration::hours(config.upload_ttl_hours),
        SWEEP_INTERVAL,
    );

    let state = AppState {
        store: store.clone(),
        blobs,
        model: Arc::new(model),
        gateway,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the frontend host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    store.close().await;
    info!("Shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
}
