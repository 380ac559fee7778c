//! Cross-column similarity search.
//!
//! One nearest-neighbour query is issued per embedding column, each asking for
//! `limit * over_fetch_factor` candidates. The per-column lists are concatenated
//! in registry order and stably sorted by similarity, so exact ties keep registry
//! order (table, then embedding column) and, within a column, the database order
//! (distance, then row id).

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::database::ColumnDescriptor;
use crate::embeddings::{Embedder, TaskType};
use crate::{RagError, Result};

/// One ranked row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    pub table: String,
    pub column: String,
    pub record_id: String,
    /// `1 - cosine distance`; not clamped
    pub similarity: f64,
}

/// Where embedding columns come from and how each one is queried
#[async_trait]
pub trait ColumnSource: Send + Sync {
    async fn embedding_columns(&self) -> Result<Vec<ColumnDescriptor>>;

    /// At most `fetch` rows of `column`, nearest first
    async fn nearest(
        &self,
        column: &ColumnDescriptor,
        query_embedding: &[f32],
        fetch: usize,
    ) -> Result<Vec<SearchResult>>;
}

/// A column that was skipped because its query failed or timed out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnFailure {
    pub table: String,
    pub column: String,
    pub error: String,
}

impl std::fmt::Display for ColumnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.table, self.column, self.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub failures: Vec<ColumnFailure>,
    pub columns_searched: usize,
}

impl SearchOutcome {
    /// Human-readable notes about skipped columns
    #[inline]
    pub fn warnings(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }
}

pub struct SearchEngine {
    columns: Arc<dyn ColumnSource>,
    embedder: Arc<dyn Embedder>,
    config: SearchConfig,
}

impl SearchEngine {
    #[inline]
    pub fn new(
        columns: Arc<dyn ColumnSource>,
        embedder: Arc<dyn Embedder>,
        config: SearchConfig,
    ) -> Self {
        Self {
            columns,
            embedder,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Embed `query` in query mode and return the global top `limit` rows.
    ///
    /// A failing column is skipped and reported in [`SearchOutcome::failures`];
    /// the search only fails as a whole when every column failed.
    #[inline]
    pub async fn search(&self, query: &str, limit: usize) -> Result<SearchOutcome> {
        self.embedder.ensure_credentials()?;

        if limit == 0 {
            return Ok(SearchOutcome::default());
        }

        let started = Instant::now();
        let query_embedding = self.embedder.embed(query, TaskType::RetrievalQuery).await?;
        let columns = self.columns.embedding_columns().await?;

        if columns.is_empty() {
            info!("No embedding columns to search");
            return Ok(SearchOutcome::default());
        }

        let fetch = limit.saturating_mul(self.config.over_fetch_factor.max(1));
        let column_timeout = Duration::from_secs(self.config.column_timeout_seconds);

        debug!(
            "Searching {} columns, {} candidates each",
            columns.len(),
            fetch
        );

        let query_embedding = query_embedding.as_slice();

        // `buffered` yields in input order, keeping the pool in registry order
        let per_column = stream::iter(columns.iter().cloned())
            .map(move |column| async move {
                self.query_column(&column, query_embedding, fetch, column_timeout)
                    .await
            })
            .buffered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let columns_searched = per_column.len();
        let mut pools = Vec::with_capacity(columns_searched);
        let mut failures = Vec::new();

        for (column, result) in columns.iter().zip(per_column) {
            match result {
                Ok(rows) => pools.push(rows),
                Err(error) => {
                    warn!(
                        "Skipping {}.{}.{}: {}",
                        column.schema, column.table, column.embedding_column, error
                    );
                    failures.push(ColumnFailure {
                        table: column.table.clone(),
                        column: column.source_column.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        if pools.is_empty() {
            let summary = failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RagError::Database(format!(
                "All {} column queries failed: {}",
                columns_searched, summary
            )));
        }

        let results = rank_candidates(pools, limit);

        info!(
            "Search returned {} results from {} columns ({} failed) in {:?}",
            results.len(),
            columns_searched,
            failures.len(),
            started.elapsed()
        );

        Ok(SearchOutcome {
            results,
            failures,
            columns_searched,
        })
    }

    async fn query_column(
        &self,
        column: &ColumnDescriptor,
        query_embedding: &[f32],
        fetch: usize,
        column_timeout: Duration,
    ) -> Result<Vec<SearchResult>> {
        match tokio::time::timeout(
            column_timeout,
            self.columns.nearest(column, query_embedding, fetch),
        )
        .await
        {
            Ok(rows) => rows,
            Err(_) => Err(RagError::Database(format!(
                "query timed out after {}s",
                column_timeout.as_secs()
            ))),
        }
    }
}

/// Merge per-column candidate lists into the global top `limit`.
///
/// `pools` must be in registry order. Sorting is stable and descending by
/// similarity; NaN similarities sort after every number.
#[inline]
pub fn rank_candidates(pools: Vec<Vec<SearchResult>>, limit: usize) -> Vec<SearchResult> {
    let mut candidates = pools.into_iter().flatten().collect::<Vec<_>>();
    candidates.sort_by(|a, b| compare_similarity(a.similarity, b.similarity));
    candidates.truncate(limit);
    candidates
}

fn compare_similarity(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
