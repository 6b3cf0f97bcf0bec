use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod tts;

use api::routes::{create_router, AppState};
use config::ServerConfig;
use tts::TtsService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    tracing::info!("Kokoro TTS Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Model path: {}", config.model_path.display());
    tracing::info!("Voices path: {}", config.voices_path.display());

    // One-shot load; the server still starts when this fails
    let tts = TtsService::load(&config.model_path, &config.voices_path);

    // Create app state
    let state = Arc::new(AppState { tts });

    // Create router
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!("Starting server on http://{}", config.addr);

    axum::serve(listener, app).await?;

    Ok(())
}
