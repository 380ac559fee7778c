
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Suffix marking a vector column that mirrors the text column it is named after
pub const EMBEDDING_SUFFIX: &str = "_embedding";

/// Name of the vector column paired with `source_column`
#[inline]
pub fn embedding_column_name(source_column: &str) -> String {
    format!("{}{}", source_column, EMBEDDING_SUFFIX)
}

/// One row of `information_schema.columns` for the tracked schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CatalogColumn {
    pub table_schema: String,
    pub table_name: String,
    pub column_name: String,
    pub ordinal_position: i32,
    pub data_type: String,
    pub udt_name: String,
    pub is_base_table: bool,
}

impl CatalogColumn {
    /// pgvector columns report `USER-DEFINED` with the `vector` udt
    #[inline]
    pub fn is_vector(&self) -> bool {
        self.data_type == "USER-DEFINED" && self.udt_name == "vector"
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        self.data_type == "text"
    }
}

/// Which fallback tier produced a table's row identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIdSource {
    /// A column named exactly `id`
    Exact,
    /// The first `uuid` or `*_id` column by ordinal position
    Conventional,
    /// The first column of the table
    FirstColumn,
    /// Nothing matched; the literal name `id` is assumed
    Default,
}

impl RowIdSource {
    /// Whether the column is expected to identify a single row
    #[inline]
    pub fn is_reliable_key(self) -> bool {
        matches!(self, Self::Exact | Self::Conventional)
    }
}

impl std::fmt::Display for RowIdSource {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            RowIdSource::Exact => write!(f, "exact"),
            RowIdSource::Conventional => write!(f, "conventional"),
            RowIdSource::FirstColumn => write!(f, "first column"),
            RowIdSource::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIdColumn {
    pub name: String,
    /// Underlying type name, used to cast bound text ids back for comparisons
    pub type_name: Option<String>,
    pub source: RowIdSource,
}

/// An embedding-bearing column and everything needed to query it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub schema: String,
    pub table: String,
    pub source_column: String,
    pub embedding_column: String,
    pub row_id: RowIdColumn,
}

impl ColumnDescriptor {
    /// `schema.table.source_column`, for logs and reports
    #[inline]
    pub fn label(&self) -> String {
        format!("{}.{}.{}", self.schema, self.table, self.source_column)
    }
}

/// A text column that may receive an embedding column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextColumn {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl TextColumn {
    #[inline]
    pub fn embedding_column(&self) -> String {
        embedding_column_name(&self.column)
    }

    #[inline]
    pub fn label(&self) -> String {
        format!("{}.{}.{}", self.schema, self.table, self.column)
    }
}

/// What provisioning did to a single text column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnChange {
    Added,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct NearestRow {
    pub text: String,
    pub record_id: Option<String>,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PendingRow {
    pub record_id: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct CoverageCounts {
    pub total: i64,
    pub embedded: i64,
}

/// Embedding coverage of one tracked column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCoverage {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub total: i64,
    pub embedded: i64,
}

impl ColumnCoverage {
    #[inline]
    pub fn remaining(&self) -> i64 {
        (self.total - self.embedded).max(0)
    }

    #[inline]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.embedded as f64 / self.total as f64 * 100.0
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}
