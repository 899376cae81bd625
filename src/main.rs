use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crmgate::api::{AppState, build_router, payload_too_large};
use crmgate::config::Config;
use crmgate::middleware::{LoggerMiddleware, Pipeline, from_middleware};
use crmgate::security::CorsMiddleware;
use crmgate::server::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if config.cors_allowed_origins.is_empty() {
        info!("CORS_ALLOWED_ORIGINS is empty, cross-origin requests get no CORS headers");
    }

    let state = Arc::new(AppState::from_config(&config)?);
    let pipeline = Pipeline::new(build_router(state))
        .layer(from_middleware(Arc::new(LoggerMiddleware)))
        .layer(from_middleware(Arc::new(CorsMiddleware::new(
            config.cors_allowed_origins.iter().cloned(),
        ))));

    let server = Server::bind(&config.bind_addr)
        .await?
        .with_max_request_bytes(config.max_request_bytes)
        .with_payload_too_large(payload_too_large(&config));

    server
        .run_until(
            move |req| {
                let pipeline = pipeline.clone();
                async move { pipeline.handle(req).await }
            },
            async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("received Ctrl-C");
                }
            },
        )
        .await?;

    Ok(())
}
