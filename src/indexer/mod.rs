// Embedding maintenance
// Adds vector columns next to text columns, fills them in document mode and reports coverage

pub mod coverage;
pub mod provision;


use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::RagError;
use crate::config::Config;
use crate::database::{ColumnCoverage, ColumnDescriptor, Database, PendingRow};
use crate::embeddings::{Embedder, TaskType};
use crate::text::truncate_chars;

pub use coverage::{CoverageReport, collect_coverage};
pub use provision::{ProvisionReport, SchemaStore, provision_columns};

/// Row access needed to fill and measure embedding columns
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Rows with source text and no embedding, ordered by row id and starting
    /// after the row id `after` when given
    async fn pending_rows(
        &self,
        column: &ColumnDescriptor,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<PendingRow>>;

    /// Returns the number of rows updated
    async fn store_embedding(
        &self,
        column: &ColumnDescriptor,
        record_id: &str,
        embedding: Vec<f32>,
    ) -> Result<u64>;

    async fn coverage(&self, column: &ColumnDescriptor) -> Result<ColumnCoverage>;
}

#[async_trait]
impl EmbeddingStore for Database {
    async fn pending_rows(
        &self,
        column: &ColumnDescriptor,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<PendingRow>> {
        Database::pending_rows(self, column, after, limit).await
    }

    async fn store_embedding(
        &self,
        column: &ColumnDescriptor,
        record_id: &str,
        embedding: Vec<f32>,
    ) -> Result<u64> {
        Database::store_embedding(self, column, record_id, embedding).await
    }

    async fn coverage(&self, column: &ColumnDescriptor) -> Result<ColumnCoverage> {
        Database::coverage(self, column).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingOptions {
    pub rows_per_batch: u32,
    pub max_document_chars: usize,
    /// Texts per embedding request
    pub request_size: usize,
    pub request_delay: Duration,
    /// Stop after this many rows have been embedded across all columns
    pub max_rows: Option<u64>,
}

impl IndexingOptions {
    #[inline]
    pub fn from_config(config: &Config, max_rows: Option<u64>) -> Self {
        Self {
            rows_per_batch: config.indexing.rows_per_batch,
            max_document_chars: config.indexing.max_document_chars,
            request_size: config.gemini.batch_size as usize,
            request_delay: Duration::from_millis(config.indexing.request_delay_ms),
            max_rows,
        }
    }
}

/// Outcome for one embedding column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnStats {
    pub label: String,
    pub rows_embedded: u64,
    /// Rows with whitespace-only text or no row id
    pub rows_skipped: u64,
    pub errors: u64,
    pub batches: u64,
}

/// Statistics about one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub columns: Vec<ColumnStats>,
    /// Columns left alone because their row id is not a reliable key
    pub columns_skipped: Vec<String>,
}

impl IndexingStats {
    #[inline]
    pub fn rows_embedded(&self) -> u64 {
        self.columns.iter().map(|column| column.rows_embedded).sum()
    }

    #[inline]
    pub fn rows_skipped(&self) -> u64 {
        self.columns.iter().map(|column| column.rows_skipped).sum()
    }

    #[inline]
    pub fn errors(&self) -> u64 {
        self.columns.iter().map(|column| column.errors).sum()
    }
}

/// Text to embed for one row, or `None` when there is nothing worth embedding.
/// Longer text is cut to `max_chars` characters.
#[inline]
pub fn prepare_document(text: &str, max_chars: usize) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    let (document, truncated) = truncate_chars(text, max_chars);
    if truncated {
        debug!("Document truncated to {} characters", max_chars);
    }
    Some(document.to_string())
}

pub struct EmbeddingIndexer {
    store: Arc<dyn EmbeddingStore>,
    embedder: Arc<dyn Embedder>,
    options: IndexingOptions,
}

impl EmbeddingIndexer {
    #[inline]
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        embedder: Arc<dyn Embedder>,
        options: IndexingOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            options,
        }
    }

    /// Fill every column in `columns` until nothing is pending or the row budget is spent.
    ///
    /// Failures on individual rows, requests or columns are counted and logged;
    /// only a missing credential stops the run.
    #[inline]
    pub async fn index_columns(&self, columns: &[ColumnDescriptor]) -> crate::Result<IndexingStats> {
        self.embedder.ensure_credentials()?;

        let mut stats = IndexingStats::default();
        let mut budget = self.options.max_rows;

        for column in columns {
            if !column.row_id.source.is_reliable_key() {
                warn!(
                    "Skipping {}: row id {} ({}) is not a reliable key",
                    column.label(),
                    column.row_id.name,
                    column.row_id.source
                );
                stats.columns_skipped.push(column.label());
                continue;
            }

            if budget == Some(0) {
                info!("Row budget spent, stopping before {}", column.label());
                break;
            }

            let column_stats = self.index_column(column, &mut budget).await?;
            info!(
                "{}: {} embedded, {} skipped, {} errors",
                column_stats.label,
                column_stats.rows_embedded,
                column_stats.rows_skipped,
                column_stats.errors
            );
            stats.columns.push(column_stats);
        }

        Ok(stats)
    }

    async fn index_column(
        &self,
        column: &ColumnDescriptor,
        budget: &mut Option<u64>,
    ) -> crate::Result<ColumnStats> {
        let mut stats = ColumnStats {
            label: column.label(),
            ..ColumnStats::default()
        };
        let mut skipped_ids = HashSet::new();
        // Last row id seen; blank, skipped and failed rows are never fetched twice
        let mut cursor: Option<String> = None;
        let request_size = self.options.request_size.max(1);

        let bar = progress_bar(&stats.label);

        loop {
            let batch_limit = match *budget {
                Some(0) => break,
                Some(remaining) => remaining.min(u64::from(self.options.rows_per_batch)),
                None => u64::from(self.options.rows_per_batch),
            };

            let rows = match self
                .store
                .pending_rows(
                    column,
                    cursor.as_deref(),
                    i64::try_from(batch_limit).unwrap_or(i64::MAX),
                )
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Failed to fetch pending rows for {}: {:#}", stats.label, e);
                    stats.errors += 1;
                    break;
                }
            };

            if rows.is_empty() {
                debug!("No pending rows left in {}", stats.label);
                break;
            }

            stats.batches += 1;
            let exhausted = (rows.len() as u64) < batch_limit;
            // Rows without an id sort last, so a batch ending in one ends the column
            let next_cursor = rows.last().and_then(|row| row.record_id.clone());
            let documents = self.collect_documents(rows, &mut skipped_ids);
            let embedded_before = stats.rows_embedded;

            for request in documents.chunks(request_size) {
                let texts = request
                    .iter()
                    .map(|(_, text)| text.clone())
                    .collect::<Vec<_>>();

                match self
                    .embedder
                    .embed_batch(&texts, TaskType::RetrievalDocument)
                    .await
                {
                    Ok(vectors) => {
                        for ((record_id, _), vector) in request.iter().zip(vectors) {
                            match self.store.store_embedding(column, record_id, vector).await {
                                Ok(1) => {
                                    stats.rows_embedded += 1;
                                    bar.inc(1);
                                }
                                Ok(updated) => {
                                    warn!(
                                        "Row id {} of {} matched {} rows, counted as an error",
                                        record_id, stats.label, updated
                                    );
                                    stats.errors += 1;
                                }
                                Err(e) => {
                                    warn!("{:#}", e);
                                    stats.errors += 1;
                                }
                            }
                        }
                    }
                    Err(RagError::MissingCredential(message)) => {
                        bar.finish_and_clear();
                        return Err(RagError::MissingCredential(message));
                    }
                    Err(e) => {
                        warn!(
                            "Embedding request for {} rows of {} failed: {}",
                            request.len(),
                            stats.label,
                            e
                        );
                        stats.errors += request.len() as u64;
                    }
                }

                if !self.options.request_delay.is_zero() {
                    sleep(self.options.request_delay).await;
                }
            }

            let progress = stats.rows_embedded - embedded_before;
            if let Some(remaining) = budget.as_mut() {
                *remaining = remaining.saturating_sub(progress);
            }

            if exhausted {
                debug!("No pending rows left in {}", stats.label);
                break;
            }
            match next_cursor {
                Some(last) => cursor = Some(last),
                None => break,
            }
        }

        stats.rows_skipped = skipped_ids.len() as u64;
        bar.finish_and_clear();
        Ok(stats)
    }

    /// Pairs of (row id, document); rows without either are remembered as skipped
    fn collect_documents(
        &self,
        rows: Vec<PendingRow>,
        skipped_ids: &mut HashSet<String>,
    ) -> Vec<(String, String)> {
        rows.into_iter()
            .filter_map(|row| {
                let Some(record_id) = row.record_id else {
                    skipped_ids.insert(format!("<null>:{}", row.content));
                    return None;
                };
                match prepare_document(&row.content, self.options.max_document_chars) {
                    Some(document) => Some((record_id, document)),
                    None => {
                        skipped_ids.insert(record_id);
                        None
                    }
                }
            })
            .collect()
    }
}

fn progress_bar(label: &str) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {pos} rows embedded in {msg} ({elapsed})") {
        bar.set_style(style);
    }
    bar.set_message(label.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
