#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::database::{ColumnChange, Database, TextColumn};
use crate::registry;

/// Schema changes needed to provision embedding columns
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn text_columns(&self, patterns: &[String]) -> Result<Vec<TextColumn>>;

    async fn add_vector_column(&self, column: &TextColumn, dimension: u32) -> Result<ColumnChange>;
}

#[async_trait]
impl SchemaStore for Database {
    async fn text_columns(&self, patterns: &[String]) -> Result<Vec<TextColumn>> {
        registry::list_text_columns(self, patterns).await
    }

    async fn add_vector_column(&self, column: &TextColumn, dimension: u32) -> Result<ColumnChange> {
        Database::add_vector_column(self, column, dimension).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// `schema.table.column` labels that received a new embedding column
    pub added: Vec<String>,
    /// Columns whose embedding column already existed
    pub skipped: Vec<String>,
    /// Columns whose ALTER failed, with the cause
    pub failed: Vec<(String, String)>,
}

impl ProvisionReport {
    #[inline]
    pub fn candidates(&self) -> usize {
        self.added.len() + self.skipped.len() + self.failed.len()
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Add `<column>_embedding vector(dimension)` next to every matching text column.
///
/// Existing embedding columns are skipped, so repeated runs change nothing.
/// A failed ALTER is recorded and the remaining columns are still processed.
/// Only failing to list the candidates is an error.
#[inline]
pub async fn provision_columns(
    store: &dyn SchemaStore,
    patterns: &[String],
    dimension: u32,
) -> Result<ProvisionReport> {
    let candidates = store
        .text_columns(patterns)
        .await
        .context("Failed to list candidate text columns")?;

    info!("Found {} candidate text columns", candidates.len());

    let mut report = ProvisionReport::default();

    for column in &candidates {
        match store.add_vector_column(column, dimension).await {
            Ok(ColumnChange::Added) => {
                info!("Added {} to {}.{}", column.embedding_column(), column.schema, column.table);
                report.added.push(column.label());
            }
            Ok(ColumnChange::AlreadyExists) => report.skipped.push(column.label()),
            Err(e) => {
                warn!("Failed to provision {}: {:#}", column.label(), e);
                report.failed.push((column.label(), format!("{:#}", e)));
            }
        }
    }

    Ok(report)
}
