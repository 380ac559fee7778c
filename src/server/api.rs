use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::HeaderValue;
use axum::http::request::Parts;
use axum::routing::{get, post};
use std::collections::HashSet;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use super::handlers::{self, AppState};
use crate::config::ServerConfig;

/// Which browser origins may call the API with credentials
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    exact: HashSet<String>,
    pattern: Option<fancy_regex::Regex>,
}

impl OriginPolicy {
    #[inline]
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let pattern = config
            .allowed_origin_regex
            .as_deref()
            .map(fancy_regex::Regex::new)
            .transpose()
            .context("Invalid allowed origin pattern")?;

        Ok(Self {
            exact: config
                .allowed_origins
                .iter()
                .map(|origin| origin.trim_end_matches('/').to_string())
                .collect(),
            pattern,
        })
    }

    #[inline]
    pub fn allows(&self, origin: &str) -> bool {
        if self.exact.contains(origin) {
            return true;
        }

        match &self.pattern {
            Some(pattern) => pattern.is_match(origin).unwrap_or_else(|e| {
                debug!("Origin pattern failed on {}: {}", origin, e);
                false
            }),
            None => false,
        }
    }
}

/// CORS for the configured origins. Credentials are allowed, so methods and
/// headers mirror the preflight request instead of using a wildcard.
#[inline]
pub fn cors_layer(config: &ServerConfig) -> Result<CorsLayer> {
    let policy = OriginPolicy::from_config(config)?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin.to_str().is_ok_and(|origin| policy.allows(origin))
            },
        ))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

#[inline]
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Result<Router> {
    Ok(Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/search", post(handlers::search))
        .route("/chat", post(handlers::chat))
        .route("/api/query", post(handlers::query))
        .with_state(state)
        .layer(cors_layer(config)?)
        .layer(TraceLayer::new_for_http()))
}

/// Serve until Ctrl-C, letting in-flight requests finish
#[inline]
pub async fn run_server(state: Arc<AppState>, config: &ServerConfig) -> Result<()> {
    let app = router(state, config)?;

    let addr = format!("{}:{}", config.host, config.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", addr))?;

    let listener = tokio::net::TcpListener::bind(socket_addr)
        .await
        .with_context(|| format!("Failed to bind {}", socket_addr))?;

    info!("Listening on http://{}", socket_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
