#[cfg(test)]
mod tests;

use anyhow::Result;
use itertools::Itertools;

use super::EmbeddingStore;
use crate::database::{ColumnCoverage, ColumnDescriptor};

/// Number of columns listed in the "most remaining" summary
pub const TOP_REMAINING: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    pub columns: Vec<ColumnCoverage>,
}

impl CoverageReport {
    #[inline]
    pub fn new(columns: Vec<ColumnCoverage>) -> Self {
        Self { columns }
    }

    #[inline]
    pub fn total_rows(&self) -> i64 {
        self.columns.iter().map(|column| column.total).sum()
    }

    #[inline]
    pub fn embedded_rows(&self) -> i64 {
        self.columns.iter().map(|column| column.embedded).sum()
    }

    #[inline]
    pub fn remaining_rows(&self) -> i64 {
        self.columns.iter().map(ColumnCoverage::remaining).sum()
    }

    #[inline]
    pub fn percentage(&self) -> f64 {
        let total = self.total_rows();
        if total == 0 {
            return 0.0;
        }
        self.embedded_rows() as f64 / total as f64 * 100.0
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.columns.iter().all(ColumnCoverage::is_complete)
    }

    /// Incomplete columns with the most rows left, largest first; ties keep report order
    #[inline]
    pub fn most_remaining(&self, count: usize) -> Vec<&ColumnCoverage> {
        self.columns
            .iter()
            .filter(|column| !column.is_complete())
            .sorted_by(|a, b| b.remaining().cmp(&a.remaining()))
            .take(count)
            .collect()
    }
}

/// Count eligible and embedded rows of every column, in the order given
#[inline]
pub async fn collect_coverage(
    store: &dyn EmbeddingStore,
    columns: &[ColumnDescriptor],
) -> Result<CoverageReport> {
    let mut report = Vec::with_capacity(columns.len());
    for column in columns {
        report.push(store.coverage(column).await?);
    }
    Ok(CoverageReport::new(report))
}
