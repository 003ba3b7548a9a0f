//! Courtboard Back binary entrypoint wiring REST, SSE and document storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courtboard_back::{
    config::AppConfig,
    dao::{
        document_store::{DocumentStore, fs::FsDocumentStore},
        storage::StorageError,
    },
    routes,
    services::{sse_events, storage_supervisor},
    state::{AppState, SharedState},
};

const DEFAULT_STORE_ROOT: &str = "data";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());

    spawn_storage(app_state.clone());
    tokio::spawn(relay_degraded_mode(app_state.clone()));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the storage supervisor for the backend selected by `STORE_BACKEND`
/// (`fs`, `couch` or `mongo`; defaults to `fs`).
fn spawn_storage(state: SharedState) {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "fs".into());
    match backend.as_str() {
        #[cfg(feature = "couch-store")]
        "couch" => {
            use courtboard_back::dao::document_store::couchdb::{CouchConfig, CouchDocumentStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchDocumentStore::connect(config).await?;
                Ok::<Arc<dyn DocumentStore>, StorageError>(Arc::new(store))
            }));
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use courtboard_back::dao::document_store::mongodb::{MongoConfig, MongoDocumentStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoDocumentStore::connect(config).await?;
                Ok::<Arc<dyn DocumentStore>, StorageError>(Arc::new(store))
            }));
        }
        other => {
            if other != "fs" {
                warn!(backend = other, "unknown or disabled store backend; using fs");
            }
            let root = env::var("STORE_ROOT").unwrap_or_else(|_| DEFAULT_STORE_ROOT.into());
            tokio::spawn(storage_supervisor::run(state, move || {
                let root = root.clone();
                async move {
                    let store = FsDocumentStore::open(root).await?;
                    Ok::<Arc<dyn DocumentStore>, StorageError>(Arc::new(store))
                }
            }));
        }
    }
}

/// Tell every connected stream when the server enters or leaves degraded mode.
async fn relay_degraded_mode(state: SharedState) {
    let mut watcher = state.degraded_watcher();
    while watcher.changed().await.is_ok() {
        let degraded = *watcher.borrow_and_update();
        sse_events::broadcast_system_status(&state, degraded);
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
