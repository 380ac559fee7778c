//! Embedding-column registry.
//!
//! Descriptors are derived from a single catalog snapshot and never stored:
//! a column is embedding-bearing when it ends in [`EMBEDDING_SUFFIX`], is a
//! pgvector column, and its source text column exists in the same table.
//! Each table's row identifier is resolved once, by tier:
//!
//! 1. a column named exactly `id`
//! 2. the first column (by ordinal position) named `uuid` or ending in `_id`
//! 3. the first column by ordinal position
//! 4. the literal name `id`


use anyhow::Result;
use itertools::Itertools;
use tracing::{debug, warn};

use crate::database::{
    CatalogColumn, ColumnDescriptor, Database, EMBEDDING_SUFFIX, RowIdColumn, RowIdSource,
    TextColumn,
};

const DEFAULT_ROW_ID: &str = "id";

/// All embedding-bearing columns of the tracked schema, ordered by table then
/// embedding column name. Fails as a whole if the catalog cannot be read.
#[inline]
pub async fn list_embedding_columns(database: &Database) -> Result<Vec<ColumnDescriptor>> {
    let catalog = database.catalog_columns().await?;
    let descriptors = derive_descriptors(&catalog);

    debug!(
        "Registry found {} embedding columns in schema {}",
        descriptors.len(),
        database.schema()
    );
    Ok(descriptors)
}

/// Text columns in base tables whose names match one of `patterns` (case-insensitive)
#[inline]
pub async fn list_text_columns(database: &Database, patterns: &[String]) -> Result<Vec<TextColumn>> {
    let catalog = database.catalog_columns().await?;
    Ok(derive_text_columns(&catalog, patterns))
}

/// Resolve the row identifier of one table from its columns in ordinal order
#[inline]
pub fn resolve_row_id(table_columns: &[&CatalogColumn]) -> RowIdColumn {
    let found = |column: &CatalogColumn, source| RowIdColumn {
        name: column.column_name.clone(),
        type_name: Some(column.udt_name.clone()),
        source,
    };

    if let Some(column) = table_columns
        .iter()
        .find(|column| column.column_name == "id")
    {
        return found(*column, RowIdSource::Exact);
    }

    if let Some(column) = table_columns
        .iter()
        .find(|column| column.column_name == "uuid" || column.column_name.ends_with("_id"))
    {
        return found(*column, RowIdSource::Conventional);
    }

    if let Some(column) = table_columns.first() {
        return found(*column, RowIdSource::FirstColumn);
    }

    RowIdColumn {
        name: DEFAULT_ROW_ID.to_string(),
        type_name: None,
        source: RowIdSource::Default,
    }
}

/// Build descriptors from a catalog snapshot.
///
/// `catalog` may arrive in any order; columns are grouped per table and sorted
/// by ordinal position before row-id resolution.
#[inline]
pub fn derive_descriptors(catalog: &[CatalogColumn]) -> Vec<ColumnDescriptor> {
    let sorted = catalog
        .iter()
        .sorted_by(|a, b| {
            (&a.table_schema, &a.table_name, a.ordinal_position).cmp(&(
                &b.table_schema,
                &b.table_name,
                b.ordinal_position,
            ))
        })
        .collect::<Vec<_>>();

    let mut descriptors = Vec::new();

    for (_, table_columns) in &sorted
        .into_iter()
        .chunk_by(|column| (column.table_schema.clone(), column.table_name.clone()))
    {
        let table_columns = table_columns.collect::<Vec<_>>();
        let mut row_id = None;

        for column in &table_columns {
            let Some(source_column) = source_column_of(column) else {
                continue;
            };

            if !table_columns
                .iter()
                .any(|candidate| candidate.column_name == source_column)
            {
                warn!(
                    "Skipping {}.{}.{}: source column {} does not exist",
                    column.table_schema, column.table_name, column.column_name, source_column
                );
                continue;
            }

            let row_id = row_id
                .get_or_insert_with(|| resolve_row_id(&table_columns))
                .clone();

            descriptors.push(ColumnDescriptor {
                schema: column.table_schema.clone(),
                table: column.table_name.clone(),
                source_column: source_column.to_string(),
                embedding_column: column.column_name.clone(),
                row_id,
            });
        }
    }

    descriptors.sort_by(|a, b| {
        (&a.schema, &a.table, &a.embedding_column).cmp(&(&b.schema, &b.table, &b.embedding_column))
    });
    descriptors
}

/// Candidate columns for provisioning, in catalog order
#[inline]
pub fn derive_text_columns(catalog: &[CatalogColumn], patterns: &[String]) -> Vec<TextColumn> {
    let patterns = patterns
        .iter()
        .map(|pattern| pattern.trim().to_lowercase())
        .filter(|pattern| !pattern.is_empty())
        .collect::<Vec<_>>();

    catalog
        .iter()
        .filter(|column| column.is_base_table && column.is_text())
        .filter(|column| !column.column_name.ends_with(EMBEDDING_SUFFIX))
        .filter(|column| {
            let name = column.column_name.to_lowercase();
            patterns.iter().any(|pattern| name.contains(pattern.as_str()))
        })
        .map(|column| TextColumn {
            schema: column.table_schema.clone(),
            table: column.table_name.clone(),
            column: column.column_name.clone(),
        })
        .collect()
}

fn source_column_of(column: &CatalogColumn) -> Option<&str> {
    if !column.is_vector() {
        return None;
    }
    column
        .column_name
        .strip_suffix(EMBEDDING_SUFFIX)
        .filter(|source| !source.is_empty())
}
