mod config;
mod error;
mod relay;

use alpha_shared::ChatRequest;
use axum::{
    extract::rejection::JsonRejection,
    routing::{get, post},
    Json, Router,
};
use config::{Config, API_KEY_VAR};
use error::RelayError;
use relay::{OpenRouterClient, RelayService, Upstream};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let config = Config::from_env()?;

    let upstream: Option<Arc<dyn Upstream>> = match &config.api_key {
        Some(key) => {
            info!("OpenRouter API key loaded successfully");
            let client = OpenRouterClient::new(key.clone())?.with_endpoint(&config.upstream_url);
            Some(Arc::new(client) as Arc<dyn Upstream>)
        }
        None => {
            warn!(
                "{} not found; /api/chat will reject requests until it is set",
                API_KEY_VAR
            );
            None
        }
    };

    info!("Using upstream model {} at {}", relay::MODEL, config.upstream_url);
    let relay_service = Arc::new(RelayService::new(upstream));

    let app = router(relay_service, &config.static_dir);

    let addr = config.addr();
    info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(relay: Arc<RelayService>, static_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post({
            let relay = relay.clone();
            move |body| chat(body, relay)
        }))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "OK"
}

async fn chat(
    body: Result<Json<ChatRequest>, JsonRejection>,
    relay: Arc<RelayService>,
) -> Result<Json<Value>, RelayError> {
    // A missing credential wins over any problem with the request itself.
    relay.ensure_configured()?;

    let Json(request) = body.map_err(|rejection| RelayError::InvalidBody(rejection.body_text()))?;
    let payload = relay.relay(request).await?;

    Ok(Json(payload))
}
