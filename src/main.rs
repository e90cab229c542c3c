use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bible_ai_server::{
    AppState,
    api::routes::create_router,
    config::Config,
    gemini::GeminiClient,
    kv::{KvStore, MemoryKv, RedisKv},
    passage::BibleApi,
    summary::SummaryService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::load()?;
    let server_addr = config.server_addr;

    // Counters and locks live in Redis when available, in memory otherwise
    let store: Arc<dyn KvStore> = match &config.redis_url {
        Some(url) => {
            info!(%url, "connecting to redis");
            Arc::new(RedisKv::connect(url).await?)
        }
        None => {
            info!("no REDIS_URL set, using in-memory store");
            Arc::new(MemoryKv::new())
        }
    };

    let source = Arc::new(BibleApi::new(config.bible_api_url.clone()));
    let generator = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_base_url.clone(),
    ));

    let service = Arc::new(SummaryService::new(
        source,
        generator,
        store,
        config.translation_langs.clone(),
    ));

    // Create application state
    let app_state = AppState {
        config: Arc::new(config),
        service,
    };

    // Build the router with routes
    let app = create_router(app_state);

    // Create the listener
    let listener = TcpListener::bind(server_addr).await?;

    // Start the server
    info!("Listening on {}", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
