use std::{net::SocketAddr, sync::Arc};

use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing::{info, warn};

use medequip_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Backend store: remote function backend, or the in-process store for
    // development.
    let store: Arc<dyn api::store::TransferStore> =
        match cfg.backend.mode.to_ascii_lowercase().as_str() {
            "remote" => Arc::new(api::store::RemoteTransferStore::new(&cfg.backend)?),
            other => {
                if other != "memory" {
                    warn!(
                        mode = other,
                        "unknown backend mode, falling back to the in-memory store"
                    );
                }
                Arc::new(api::store::InMemoryTransferStore::new())
            }
        };

    let cache = Arc::new(api::cache::QueryCache::new(std::time::Duration::from_secs(
        cfg.cache.default_ttl_secs,
    )));

    // Domain events: background processor, notification delivery hooks in
    // externally.
    let (event_sender, event_rx) = api::events::channel(1024);
    tokio::spawn(api::events::process_events(event_rx));

    let services = api::AppServices::new(store.clone(), cache.clone(), event_sender.clone(), &cfg);
    let auth = Arc::new(api::auth::AuthVerifier::new(&cfg.jwt_secret));

    let state = api::AppState {
        config: cfg.clone(),
        auth,
        store,
        cache,
        services,
        event_sender,
    };

    let app = api::app_router(state)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_origin(Any),
        );

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!(
        %addr,
        environment = %cfg.environment,
        backend = %cfg.backend.mode,
        "starting medequip-api"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", err);
        return;
    }
    info!("shutdown signal received, draining connections");
}
