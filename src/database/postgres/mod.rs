use anyhow::{Context, Result};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::RagError;
use crate::config::DatabaseConfig;
use crate::registry;
use crate::search::{ColumnSource, SearchResult};

pub mod identifiers;
pub mod models;
pub mod queries;

pub use identifiers::{Ident, IdentifierError, QualifiedTable};
pub use models::{
    CatalogColumn, ColumnChange, ColumnCoverage, ColumnDescriptor, EMBEDDING_SUFFIX, PendingRow,
    RowIdColumn, RowIdSource, TextColumn, embedding_column_name,
};
pub use queries::{CatalogQueries, EmbeddingQueries, SchemaQueries, SearchQueries};

/// Connection pool scoped to the tracked schema
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
    schema: String,
}

impl Database {
    /// Connect and verify the server is reachable
    #[inline]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config)
            .connect_with(Self::connect_options(config)?)
            .await
            .context("Failed to create database connection pool")?;

        info!("Connected to PostgreSQL, schema {}", config.schema);

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    /// Build the pool without connecting; connections are opened on first use
    #[inline]
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config).connect_lazy_with(Self::connect_options(config)?);

        debug!("Created lazy PostgreSQL pool for schema {}", config.schema);

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
    }

    fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
        let statement_timeout_ms = config.statement_timeout_seconds.saturating_mul(1000);

        Ok(PgConnectOptions::from_str(&config.url)
            .context("Invalid database connection string")?
            .application_name("column-rag")
            .options([("statement_timeout", statement_timeout_ms.to_string())]))
    }

    #[inline]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[inline]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Snapshot of the tracked schema's columns, read over a single connection
    #[inline]
    pub async fn catalog_columns(&self) -> Result<Vec<CatalogColumn>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for catalog query")?;

        CatalogQueries::columns(&mut *conn, &self.schema).await
    }

    #[inline]
    pub async fn add_vector_column(&self, column: &TextColumn, dimension: u32) -> Result<ColumnChange> {
        SchemaQueries::add_vector_column(&self.pool, column, dimension).await
    }

    #[inline]
    pub async fn nearest_rows(
        &self,
        descriptor: &ColumnDescriptor,
        query_embedding: &Vector,
        fetch: i64,
    ) -> Result<Vec<models::NearestRow>> {
        SearchQueries::nearest(&self.pool, descriptor, query_embedding, fetch).await
    }

    #[inline]
    pub async fn pending_rows(
        &self,
        descriptor: &ColumnDescriptor,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<PendingRow>> {
        EmbeddingQueries::pending(&self.pool, descriptor, after, limit).await
    }

    #[inline]
    pub async fn store_embedding(
        &self,
        descriptor: &ColumnDescriptor,
        record_id: &str,
        embedding: Vec<f32>,
    ) -> Result<u64> {
        EmbeddingQueries::store(&self.pool, descriptor, record_id, &Vector::from(embedding)).await
    }

    #[inline]
    pub async fn coverage(&self, descriptor: &ColumnDescriptor) -> Result<ColumnCoverage> {
        EmbeddingQueries::coverage(&self.pool, descriptor).await
    }

    #[inline]
    pub async fn server_version(&self) -> Result<String> {
        CatalogQueries::server_version(&self.pool).await
    }

    #[inline]
    pub async fn pgvector_version(&self) -> Result<Option<String>> {
        CatalogQueries::pgvector_version(&self.pool).await
    }
}

#[async_trait]
impl ColumnSource for Database {
    async fn embedding_columns(&self) -> crate::Result<Vec<ColumnDescriptor>> {
        registry::list_embedding_columns(self)
            .await
            .map_err(|e| RagError::database(&e))
    }

    async fn nearest(
        &self,
        column: &ColumnDescriptor,
        query_embedding: &[f32],
        fetch: usize,
    ) -> crate::Result<Vec<SearchResult>> {
        let fetch = i64::try_from(fetch)
            .map_err(|_| RagError::Validation(format!("Candidate count {} is too large", fetch)))?;
        let query_embedding = Vector::from(query_embedding.to_vec());

        let rows = self
            .nearest_rows(column, &query_embedding, fetch)
            .await
            .map_err(|e| RagError::database(&e))?;

        Ok(rows
            .into_iter()
            .map(|row| SearchResult {
                text: row.text,
                table: column.table.clone(),
                column: column.source_column.clone(),
                record_id: row.record_id.unwrap_or_default(),
                similarity: row.similarity,
            })
            .collect())
    }
}
