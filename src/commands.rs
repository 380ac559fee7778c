use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::config::interactive::{describe_api_key, redact_password};
use crate::database::Database;
use crate::embeddings::GeminiClient;
use crate::indexer::coverage::TOP_REMAINING;
use crate::indexer::{
    EmbeddingIndexer, IndexingOptions, collect_coverage, provision_columns,
};
use crate::registry;
use crate::search::SearchEngine;
use crate::server::{AppState, run_server};
use crate::synthesis::Synthesizer;
use crate::text::truncate_with_ellipsis;

/// Characters of row text printed per CLI search result
const CLI_PREVIEW_CHARS: usize = 160;

fn gemini_client(config: &Config) -> Result<Arc<GeminiClient>> {
    Ok(Arc::new(
        GeminiClient::new(&config.gemini).context("Failed to initialize Gemini client")?,
    ))
}

/// Add `<column>_embedding` vector columns next to every matching text column
#[inline]
pub async fn provision(config: &Config) -> Result<()> {
    let database = Database::connect(&config.database).await?;

    println!(
        "Looking for text columns matching [{}] in schema {}",
        config.indexing.text_column_patterns.join(", "),
        style(&config.database.schema).cyan()
    );

    let report = provision_columns(
        &database,
        &config.indexing.text_column_patterns,
        config.gemini.embedding_dimension,
    )
    .await?;

    if report.candidates() == 0 {
        println!("No matching text columns found.");
        return Ok(());
    }

    for label in &report.added {
        println!("  {} {}", style("✓ added").green(), label);
    }
    for label in &report.skipped {
        println!("  {} {}", style("- exists").dim(), label);
    }
    for (label, error) in &report.failed {
        println!("  {} {}: {}", style("✗ failed").red(), label, error);
    }

    println!();
    println!(
        "{} added, {} already present, {} failed",
        report.added.len(),
        report.skipped.len(),
        report.failed.len()
    );

    if !report.is_success() {
        anyhow::bail!("{} columns could not be provisioned", report.failed.len());
    }
    Ok(())
}

/// Generate embeddings for every row that does not have one yet
#[inline]
pub async fn embed(config: &Config, max_rows: Option<u64>) -> Result<()> {
    let database = Arc::new(Database::connect(&config.database).await?);
    let client = gemini_client(config)?;

    let columns = registry::list_embedding_columns(&database).await?;
    if columns.is_empty() {
        println!("No embedding columns found. Run 'column-rag provision' first.");
        return Ok(());
    }

    println!(
        "Embedding {} columns with {} ({} rows per batch)",
        columns.len(),
        style(client.embedding_model()).cyan(),
        config.indexing.rows_per_batch
    );

    let indexer = EmbeddingIndexer::new(
        database,
        client,
        IndexingOptions::from_config(config, max_rows),
    );
    let stats = indexer.index_columns(&columns).await?;

    for label in &stats.columns_skipped {
        println!(
            "  {} {} (no reliable row id)",
            style("- skipped").yellow(),
            label
        );
    }
    for column in &stats.columns {
        println!(
            "  {} {}: {} embedded, {} skipped, {} errors",
            if column.errors == 0 {
                style("✓").green()
            } else {
                style("!").yellow()
            },
            column.label,
            column.rows_embedded,
            column.rows_skipped,
            column.errors
        );
    }

    println!();
    println!(
        "Done: {} rows embedded, {} skipped, {} errors",
        stats.rows_embedded(),
        stats.rows_skipped(),
        stats.errors()
    );
    Ok(())
}

/// Print how much of every embedding column has been filled
#[inline]
pub async fn progress(config: &Config) -> Result<()> {
    let database = Database::connect(&config.database).await?;
    let columns = registry::list_embedding_columns(&database).await?;

    if columns.is_empty() {
        println!("No embedding columns found.");
        return Ok(());
    }

    let report = collect_coverage(&database, &columns).await?;

    println!("{}", style("📊 Embedding Coverage").bold().cyan());
    println!();

    for column in &report.columns {
        let marker = if column.is_complete() {
            style("✓").green()
        } else {
            style("…").yellow()
        };
        println!(
            "{} {}.{}: {}/{} ({:.1}%), {} remaining",
            marker,
            column.table,
            column.column,
            column.embedded,
            column.total,
            column.percentage(),
            column.remaining()
        );
    }

    println!();
    println!(
        "Total: {}/{} rows ({:.1}%), {} remaining",
        report.embedded_rows(),
        report.total_rows(),
        report.percentage(),
        report.remaining_rows()
    );

    let most_remaining = report.most_remaining(TOP_REMAINING);
    if most_remaining.is_empty() {
        println!("{}", style("All columns are fully embedded.").green());
    } else {
        println!();
        println!("{}", style("Most rows remaining:").bold().yellow());
        for column in most_remaining {
            println!(
                "  {}.{}: {}",
                column.table,
                column.column,
                column.remaining()
            );
        }
    }

    Ok(())
}

/// Verify the database, pgvector and the Gemini credential
#[inline]
pub async fn check(config: &Config) -> Result<()> {
    println!("{}", style("🔍 Checking setup").bold().cyan());
    println!();

    println!(
        "Database: {}",
        style(redact_password(&config.database.url)).cyan()
    );
    let database = Database::connect(&config.database)
        .await
        .context("Database is not reachable")?;
    let version = database.server_version().await?;
    println!("  {} {}", style("✓").green(), version);

    match database.pgvector_version().await? {
        Some(version) => println!("  {} pgvector {}", style("✓").green(), version),
        None => {
            println!("  {} pgvector extension is not installed", style("✗").red());
            anyhow::bail!("Run CREATE EXTENSION vector; in the target database");
        }
    }

    let columns = registry::list_embedding_columns(&database).await?;
    println!(
        "  {} {} embedding columns in schema {}",
        style("✓").green(),
        columns.len(),
        config.database.schema
    );

    println!();
    println!(
        "API key: {}",
        style(describe_api_key(config.gemini.api_key.as_deref())).cyan()
    );

    if config.gemini.api_key.is_some() {
        let client = gemini_client(config)?;
        match tokio::task::spawn_blocking(move || client.health_check()).await? {
            Ok(model) => println!("  {} model {} is available", style("✓").green(), model.name),
            Err(e) => {
                warn!("Gemini check failed: {:#}", e);
                println!("  {} Gemini API check failed: {:#}", style("!").yellow(), e);
            }
        }
    }

    Ok(())
}

/// Run one search from the command line
#[inline]
pub async fn search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let database = Arc::new(Database::connect(&config.database).await?);
    let engine = SearchEngine::new(database, gemini_client(config)?, config.search.clone());

    let limit = limit.unwrap_or(config.search.default_limit);
    let outcome = engine.search(query, limit).await?;

    for warning in outcome.warnings() {
        println!("{} {}", style("warning:").yellow(), warning);
    }

    if outcome.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, result) in outcome.results.iter().enumerate() {
        println!(
            "{}. {} {}.{} #{}",
            rank + 1,
            style(format!("{:.4}", result.similarity)).cyan(),
            result.table,
            result.column,
            result.record_id
        );
        println!(
            "   {}",
            truncate_with_ellipsis(&result.text.replace('\n', " "), CLI_PREVIEW_CHARS)
        );
    }

    Ok(())
}

/// Start the HTTP API
#[inline]
pub async fn serve(config: &Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut server_config = config.server.clone();
    if let Some(host) = host {
        server_config.host = host;
    }
    if let Some(port) = port {
        server_config.set_port(port)?;
    }

    if config.gemini.api_key.is_none() {
        warn!(
            "{}; search and chat requests will fail until it is set",
            describe_api_key(None)
        );
    }

    // Connections are opened on demand so the API can start before the database
    let database = Arc::new(Database::connect_lazy(&config.database)?);
    let client = gemini_client(config)?;

    let state = Arc::new(AppState::new(
        SearchEngine::new(database, client.clone(), config.search.clone()),
        Synthesizer::new(client),
    ));

    info!(
        "Starting API for schema {} on {}:{}",
        config.database.schema, server_config.host, server_config.port
    );
    eprintln!(
        "{} http://{}:{}",
        style("Column RAG API listening on").bold().green(),
        server_config.host,
        server_config.port
    );

    run_server(state, &server_config).await
}
