use forum_backend::config::Config;
use forum_backend::database::connect_store;
use forum_backend::redis::RedisClient;
use forum_backend::storage::{ForumStore, memory::MemoryStore};
use forum_backend::{AppState, create_app};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forum_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Pick the store
    let store: Arc<dyn ForumStore> = match &config.database_url {
        Some(database_url) => {
            Arc::new(connect_store(database_url, config.database_max_connections).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // Create Redis client
    let redis = match &config.redis_url {
        Some(redis_url) => {
            let client = RedisClient::new(redis_url).await?;
            tracing::info!("Redis client created");
            Some(Arc::new(client))
        }
        None => {
            tracing::info!("REDIS_URL not set, reply cache and sessions disabled");
            None
        }
    };

    let address = format!("{}:{}", config.host, config.port);

    // Create application
    let app = create_app(AppState::new(store, redis, config));

    // Create listener
    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Server listening on {}", address);

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
