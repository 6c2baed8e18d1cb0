use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use shared_config::AppConfig;
use shared_database::{InMemoryStore, SeedData};
use shared_utils::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting booking API server");

    let config = AppConfig::from_env();
    let store = match &config.seed_data_path {
        Some(path) => InMemoryStore::from_seed(load_seed(path)?),
        None => {
            warn!("SEED_DATA_PATH not set, starting with an empty catalog");
            InMemoryStore::new()
        }
    };

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(Arc::new(config), Arc::new(store));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Listening on {}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn load_seed(path: &str) -> anyhow::Result<SeedData> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed data from {}", path))?;
    let seed: SeedData = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse seed data in {}", path))?;
    info!(
        "Loaded seed data: {} locations, {} services, {} technicians, {} resources",
        seed.locations.len(),
        seed.services.len(),
        seed.technicians.len(),
        seed.resources.len()
    );
    Ok(seed)
}
