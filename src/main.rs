// src/main.rs

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use colloquy::api;
use colloquy::config::CONFIG;
use colloquy::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(CONFIG.log_level.clone())),
        )
        .init();

    let state = AppState::assemble();
    let app = api::router(state);

    let addr = CONFIG.bind_address();
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
