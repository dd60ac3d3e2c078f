//! Issuer HTTP server: account registry and trust root for the tollgate
//! micropayment protocol.
//!
//! # Usage
//!
//! ```bash
//! CONFIG=/path/to/config.toml cargo run -p tollgate-issuer --release
//! RUST_LOG=info cargo run -p tollgate-issuer
//! ```
//!
//! # Environment variables
//!
//! - `CONFIG` — path to the TOML configuration file (default: `config.toml`)
//! - `HOST` — override the bind address
//! - `PORT` — override the bind port
//! - `ISSUER_PRIVATE_KEY_PATH` — referenced by `$ISSUER_PRIVATE_KEY_PATH` in the config file
//! - `RUST_LOG` — log level filter (default: `info`)

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::{Json, Router};
use tower_http::cors;
use tracing_subscriber::EnvFilter;

use tollgate_core::crypto::keys::PrivateKey;
use tollgate_issuer::config::IssuerConfig;
use tollgate_issuer::handlers::{issuer_router, IssuerState};
use tollgate_issuer::service::IssuerService;
use tollgate_storage::memory::InMemoryStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!("Issuer failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = IssuerConfig::load()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        "Loaded configuration"
    );

    let issuer_key = PrivateKey::from_pem_file(&config.issuer_private_key_path)?;
    tracing::info!(public_key = %issuer_key.public_key().der_b64(), "Loaded issuer key");

    // Only an in-process store is wired up for now: the stack carries no KV
    // client crate, so the channel/account state does not survive a
    // restart. A real deployment fronting this with Redis or similar would
    // swap the `Arc<dyn KvStore>` below for a client hitting the KV-store
    // URL this binary otherwise ignores.
    let store = Arc::new(InMemoryStore::new());
    let service = Arc::new(IssuerService::new(store, issuer_key));
    let state: IssuerState = service;

    let cors_layer = if config.cors_origins.is_empty() {
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        cors::CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any)
    };

    let app = Router::new()
        .merge(issuer_router(Arc::clone(&state)))
        .route("/health", axum::routing::get(health))
        .layer(cors_layer);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Issuer listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Issuer shut down gracefully");
    Ok(())
}

/// Health check endpoint.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
