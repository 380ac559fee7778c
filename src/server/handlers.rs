use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::{Value, json};
use tracing::debug;

use super::types::*;
use crate::search::SearchEngine;
use crate::synthesis::{NO_INFORMATION_ANSWER, Synthesizer};
use crate::{RagError, Result};

/// Result count of the citation endpoint, which takes no limit
pub const CITATION_LIMIT: usize = 5;

pub struct AppState {
    pub search: SearchEngine,
    pub synthesizer: Synthesizer,
}

impl AppState {
    #[inline]
    pub fn new(search: SearchEngine, synthesizer: Synthesizer) -> Self {
        Self {
            search,
            synthesizer,
        }
    }

    /// Default when absent; otherwise must lie within `1..=max_limit`
    #[inline]
    pub fn resolve_limit(&self, requested: Option<usize>) -> Result<usize> {
        let config = self.search.config();
        let limit = requested.unwrap_or(config.default_limit);

        if limit == 0 || limit > config.max_limit {
            return Err(RagError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                config.max_limit, limit
            )));
        }
        Ok(limit)
    }
}

fn validate_query(query: &str) -> Result<&str> {
    if query.trim().is_empty() {
        return Err(RagError::Validation("query cannot be empty".to_string()));
    }
    Ok(query)
}

#[inline]
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Column RAG API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/search": "Semantic search across every embedding column",
            "/chat": "Search plus a generated answer with its context",
            "/api/query": "Generated answer with source citations",
            "/health": "Health check"
        }
    }))
}

#[inline]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

#[inline]
pub async fn search(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>> {
    let Json(request) = payload?;
    let limit = state.resolve_limit(request.limit)?;
    let query = validate_query(&request.query)?;

    let outcome = state.search.search(query, limit).await?;
    let warnings = outcome.warnings();

    Ok(Json(SearchResponse {
        query: request.query,
        results: outcome.results,
        warnings,
    }))
}

#[inline]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let Json(request) = payload?;
    let limit = state.resolve_limit(request.limit)?;
    let query = validate_query(&request.query)?;

    let outcome = state.search.search(query, limit).await?;
    let answer = state.synthesizer.synthesize(query, &outcome.results).await?;
    let warnings = outcome.warnings();

    Ok(Json(ChatResponse {
        query: request.query,
        answer,
        context: outcome.results,
        warnings,
    }))
}

#[inline]
pub async fn query(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>> {
    let Json(request) = payload?;
    let query = validate_query(&request.query)?;

    let outcome = state.search.search(query, CITATION_LIMIT).await?;

    if outcome.results.is_empty() {
        debug!("Nothing retrieved, answering without generation");
        return Ok(Json(QueryResponse {
            answer: NO_INFORMATION_ANSWER.to_string(),
            sources: Vec::new(),
        }));
    }

    let answer = state.synthesizer.synthesize(query, &outcome.results).await?;

    Ok(Json(QueryResponse {
        answer,
        sources: outcome.results.iter().map(Source::from).collect(),
    }))
}
