
use super::identifiers::{Ident, IdentifierError, QualifiedTable};
use super::models::*;
use anyhow::{Context, Result};
use pgvector::Vector;
use sqlx::postgres::PgExecutor;
use sqlx::PgPool;
use tracing::{debug, warn};

/// Quoted identifiers of one descriptor, built once per statement
#[derive(Debug, Clone)]
pub(crate) struct DescriptorIdents {
    pub table: QualifiedTable,
    pub source: Ident,
    pub embedding: Ident,
    pub row_id: Ident,
    pub row_id_type: Option<Ident>,
}

impl DescriptorIdents {
    pub(crate) fn new(descriptor: &ColumnDescriptor) -> Result<Self, IdentifierError> {
        Ok(Self {
            table: QualifiedTable::new(&descriptor.schema, &descriptor.table)?,
            source: Ident::quote(&descriptor.source_column)?,
            embedding: Ident::quote(&descriptor.embedding_column)?,
            row_id: Ident::quote(&descriptor.row_id.name)?,
            row_id_type: descriptor
                .row_id
                .type_name
                .as_deref()
                .map(Ident::quote)
                .transpose()?,
        })
    }

    /// Predicate selecting rows whose source text is worth embedding
    fn has_text(&self) -> String {
        format!(
            "{source} IS NOT NULL AND {source}::text <> ''",
            source = self.source
        )
    }
}

pub struct CatalogQueries;

impl CatalogQueries {
    const COLUMNS_SQL: &'static str = r#"
        SELECT c.table_schema::text AS table_schema,
               c.table_name::text AS table_name,
               c.column_name::text AS column_name,
               c.ordinal_position::int4 AS ordinal_position,
               c.data_type::text AS data_type,
               c.udt_name::text AS udt_name,
               (t.table_type = 'BASE TABLE') AS is_base_table
        FROM information_schema.columns c
        JOIN information_schema.tables t
          ON t.table_schema = c.table_schema
         AND t.table_name = c.table_name
        WHERE c.table_schema = $1
        ORDER BY c.table_name, c.ordinal_position
    "#;

    /// Every column of every table and view in `schema`, grouped by table in ordinal order
    #[inline]
    pub async fn columns<'e, E>(executor: E, schema: &str) -> Result<Vec<CatalogColumn>>
    where
        E: PgExecutor<'e>,
    {
        let columns = sqlx::query_as::<_, CatalogColumn>(Self::COLUMNS_SQL)
            .bind(schema)
            .fetch_all(executor)
            .await
            .with_context(|| format!("Failed to read column catalog for schema {}", schema))?;

        debug!("Catalog for schema {} has {} columns", schema, columns.len());
        Ok(columns)
    }

    #[inline]
    pub async fn column_exists<'e, E>(
        executor: E,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<bool>
    where
        E: PgExecutor<'e>,
    {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
            )
            "#,
        )
        .bind(schema)
        .bind(table)
        .bind(column)
        .fetch_one(executor)
        .await
        .with_context(|| {
            format!(
                "Failed to check whether {}.{}.{} exists",
                schema, table, column
            )
        })?;

        Ok(exists)
    }

    #[inline]
    pub async fn server_version(pool: &PgPool) -> Result<String> {
        sqlx::query_scalar("SELECT version()")
            .fetch_one(pool)
            .await
            .context("Failed to query server version")
    }

    #[inline]
    pub async fn pgvector_version(pool: &PgPool) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(pool)
            .await
            .context("Failed to query pgvector extension")
    }
}

pub struct SearchQueries;

impl SearchQueries {
    /// Cosine nearest neighbours of `$1` within one column, limited to `$2` rows.
    /// Ties on distance are broken by row id so repeated runs agree.
    pub(crate) fn nearest_sql(idents: &DescriptorIdents) -> String {
        format!(
            r#"
            SELECT {source}::text AS text,
                   {row_id}::text AS record_id,
                   (1 - ({embedding} <=> $1))::float8 AS similarity
            FROM {table}
            WHERE {embedding} IS NOT NULL
              AND {has_text}
            ORDER BY {embedding} <=> $1, {row_id}
            LIMIT $2
            "#,
            source = idents.source,
            row_id = idents.row_id,
            embedding = idents.embedding,
            table = idents.table,
            has_text = idents.has_text(),
        )
    }

    #[inline]
    pub async fn nearest(
        pool: &PgPool,
        descriptor: &ColumnDescriptor,
        query_embedding: &Vector,
        fetch: i64,
    ) -> Result<Vec<NearestRow>> {
        let idents = DescriptorIdents::new(descriptor)
            .with_context(|| format!("Invalid identifier in {}", descriptor.label()))?;

        let rows = sqlx::query_as::<_, NearestRow>(&Self::nearest_sql(&idents))
            .bind(query_embedding)
            .bind(fetch)
            .fetch_all(pool)
            .await
            .with_context(|| format!("Similarity query failed for {}", descriptor.label()))?;

        debug!(
            "{} returned {} candidates (requested {})",
            descriptor.label(),
            rows.len(),
            fetch
        );
        Ok(rows)
    }
}

pub struct EmbeddingQueries;

impl EmbeddingQueries {
    /// Keyset page of pending rows; with `after_cursor` only rows past `$2` are returned
    pub(crate) fn pending_sql(idents: &DescriptorIdents, after_cursor: bool) -> String {
        let (order_key, cursor) = match &idents.row_id_type {
            Some(type_name) => (idents.row_id.to_string(), format!("$2::{}", type_name)),
            None => (format!("{}::text", idents.row_id), "$2".to_string()),
        };
        let keyset = if after_cursor {
            format!("AND {} > {}", order_key, cursor)
        } else {
            String::new()
        };

        format!(
            r#"
            SELECT {row_id}::text AS record_id,
                   {source}::text AS content
            FROM {table}
            WHERE {has_text}
              AND {embedding} IS NULL
              {keyset}
            ORDER BY {order_key}
            LIMIT $1
            "#,
            row_id = idents.row_id,
            source = idents.source,
            table = idents.table,
            has_text = idents.has_text(),
            embedding = idents.embedding,
        )
    }

    pub(crate) fn store_sql(idents: &DescriptorIdents) -> String {
        let key_match = match &idents.row_id_type {
            Some(type_name) => format!("{} = $2::{}", idents.row_id, type_name),
            None => format!("{}::text = $2", idents.row_id),
        };

        format!(
            "UPDATE {table} SET {embedding} = $1 WHERE {key_match}",
            table = idents.table,
            embedding = idents.embedding,
        )
    }

    pub(crate) fn coverage_sql(idents: &DescriptorIdents) -> String {
        format!(
            r#"
            SELECT COUNT(*)::int8 AS total,
                   COUNT({embedding})::int8 AS embedded
            FROM {table}
            WHERE {has_text}
            "#,
            embedding = idents.embedding,
            table = idents.table,
            has_text = idents.has_text(),
        )
    }

    /// Rows with source text but no embedding yet, ordered by row id and
    /// starting after `after` when given
    #[inline]
    pub async fn pending(
        pool: &PgPool,
        descriptor: &ColumnDescriptor,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<PendingRow>> {
        let idents = DescriptorIdents::new(descriptor)
            .with_context(|| format!("Invalid identifier in {}", descriptor.label()))?;

        let sql = Self::pending_sql(&idents, after.is_some());
        let mut query = sqlx::query_as::<_, PendingRow>(&sql).bind(limit);
        if let Some(after) = after {
            query = query.bind(after);
        }

        query
            .fetch_all(pool)
            .await
            .with_context(|| format!("Failed to fetch pending rows for {}", descriptor.label()))
    }

    /// Writes one embedding; returns the number of rows updated.
    ///
    /// A write matching more than one row is rolled back and reported as an error.
    #[inline]
    pub async fn store(
        pool: &PgPool,
        descriptor: &ColumnDescriptor,
        record_id: &str,
        embedding: &Vector,
    ) -> Result<u64> {
        let idents = DescriptorIdents::new(descriptor)
            .with_context(|| format!("Invalid identifier in {}", descriptor.label()))?;

        let mut tx = pool
            .begin()
            .await
            .context("Failed to begin embedding write")?;

        let updated = sqlx::query(&Self::store_sql(&idents))
            .bind(embedding)
            .bind(record_id)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "Failed to store embedding for {} row {}",
                    descriptor.label(),
                    record_id
                )
            })?
            .rows_affected();

        if updated > 1 {
            tx.rollback()
                .await
                .context("Failed to roll back embedding write")?;
            anyhow::bail!(
                "Row id {} of {} matched {} rows; it is not a unique key",
                record_id,
                descriptor.label(),
                updated
            );
        }

        tx.commit()
            .await
            .context("Failed to commit embedding write")?;

        if updated == 0 {
            warn!(
                "Embedding write for {} row {} matched no rows",
                descriptor.label(),
                record_id
            );
        }

        Ok(updated)
    }

    #[inline]
    pub async fn coverage(pool: &PgPool, descriptor: &ColumnDescriptor) -> Result<ColumnCoverage> {
        let idents = DescriptorIdents::new(descriptor)
            .with_context(|| format!("Invalid identifier in {}", descriptor.label()))?;

        let counts = sqlx::query_as::<_, CoverageCounts>(&Self::coverage_sql(&idents))
            .fetch_one(pool)
            .await
            .with_context(|| format!("Failed to count embeddings for {}", descriptor.label()))?;

        Ok(ColumnCoverage {
            schema: descriptor.schema.clone(),
            table: descriptor.table.clone(),
            column: descriptor.source_column.clone(),
            total: counts.total,
            embedded: counts.embedded,
        })
    }
}

pub struct SchemaQueries;

impl SchemaQueries {
    pub(crate) fn add_vector_column_sql(
        column: &TextColumn,
        dimension: u32,
    ) -> Result<String, IdentifierError> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {} vector({})",
            QualifiedTable::new(&column.schema, &column.table)?,
            Ident::quote(&column.embedding_column())?,
            dimension
        ))
    }

    /// Adds the nullable vector column next to `column` unless it already exists.
    /// The ALTER runs in its own transaction and is rolled back on failure.
    #[inline]
    pub async fn add_vector_column(
        pool: &PgPool,
        column: &TextColumn,
        dimension: u32,
    ) -> Result<ColumnChange> {
        let embedding_column = column.embedding_column();

        if CatalogQueries::column_exists(pool, &column.schema, &column.table, &embedding_column)
            .await?
        {
            debug!("{}.{} already exists", column.label(), embedding_column);
            return Ok(ColumnChange::AlreadyExists);
        }

        let statement = Self::add_vector_column_sql(column, dimension)
            .with_context(|| format!("Invalid identifier in {}", column.label()))?;

        let mut tx = pool
            .begin()
            .await
            .context("Failed to start schema transaction")?;

        match sqlx::query(&statement).execute(&mut *tx).await {
            Ok(_) => {
                tx.commit().await.with_context(|| {
                    format!("Failed to commit new column for {}", column.label())
                })?;
                Ok(ColumnChange::Added)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(
                        "Rollback after failed ALTER on {} also failed: {}",
                        column.label(),
                        rollback_error
                    );
                }
                Err(anyhow::Error::new(e)
                    .context(format!("Failed to add {} to {}", embedding_column, column.label())))
            }
        }
    }
}
