use std::sync::Arc;

use cleanapi::{
    api,
    config::Config,
    core::prelude::*,
    store::{BookingStore, DBClient, MemoryStore},
};
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cleanapi=debug,tower_http=debug")),
        )
        .init();

    let config = Config::init();

    let store: Arc<dyn BookingStore> = match &config.database_url {
        Some(url) => match DBClient::connect(url, config.database_max_connections).await {
            Ok(db) => {
                tracing::info!("connected to the database");
                Arc::new(db)
            }
            Err(err) => {
                tracing::error!("failed to connect to the database: {}", err);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("DATABASE_URL is not set, bookings are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let port = config.port;
    let app = api::router(AppState::new(config, store));

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind port {}: {}", port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("listening on {}", port);
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("server error: {}", err);
    }
}
