use serde::{Deserialize, Serialize};

use crate::search::SearchResult;
use crate::text::truncate_with_ellipsis;

/// Characters of row text shown in a citation
pub const SNIPPET_CHAR_BUDGET: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    /// Columns skipped because their query failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub type ChatRequest = SearchRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub query: String,
    pub answer: String,
    pub context: Vec<SearchResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// A citation in the shape the chat frontend renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl From<&SearchResult> for Source {
    fn from(result: &SearchResult) -> Self {
        Self {
            id: result.record_id.clone(),
            title: format!("{}.{}", result.table, result.column),
            url: "#".to_string(),
            snippet: truncate_with_ellipsis(&result.text, SNIPPET_CHAR_BUDGET),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
