#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::settings::{API_KEY_ENV, DATABASE_URL_ENV};
use super::{Config, ConfigError, DatabaseConfig, GeminiConfig};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Column RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Database Configuration").bold().yellow());
    eprintln!("PostgreSQL database with the pgvector extension.");
    eprintln!(
        "{}",
        style(format!("{} overrides the URL saved here.", DATABASE_URL_ENV)).dim()
    );
    eprintln!();

    configure_database(&mut config.database)?;

    eprintln!();
    eprintln!("{}", style("Gemini Configuration").bold().yellow());
    eprintln!(
        "The API key is read from {} and never stored in the config file.",
        API_KEY_ENV
    );
    eprintln!();

    configure_gemini(&mut config.gemini)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_gemini_connection(&config.gemini) {
        eprintln!("{}", style("✓ Gemini API reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the Gemini API").yellow()
        );
        eprintln!("You can continue, but search and indexing need the API to be reachable.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Database Settings:").bold().yellow());
    eprintln!(
        "  URL: {}",
        style(redact_password(&config.database.url)).cyan()
    );
    eprintln!("  Schema: {}", style(&config.database.schema).cyan());
    eprintln!(
        "  Max Connections: {}",
        style(config.database.max_connections).cyan()
    );
    eprintln!(
        "  Statement Timeout: {}s",
        style(config.database.statement_timeout_seconds).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Gemini Settings:").bold().yellow());
    eprintln!("  API: {}", style(&config.gemini.base_url).cyan());
    eprintln!(
        "  Embedding Model: {} ({} dimensions)",
        style(&config.gemini.embedding_model).cyan(),
        config.gemini.embedding_dimension
    );
    eprintln!("  Chat Model: {}", style(&config.gemini.chat_model).cyan());
    eprintln!("  Batch Size: {}", style(config.gemini.batch_size).cyan());
    eprintln!(
        "  API Key: {}",
        style(describe_api_key(config.gemini.api_key.as_deref())).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Server Settings:").bold().yellow());
    eprintln!(
        "  Listen: {}:{}",
        style(&config.server.host).cyan(),
        style(config.server.port).cyan()
    );
    eprintln!(
        "  Allowed Origins: {}",
        style(config.server.allowed_origins.join(", ")).cyan()
    );
    if let Some(pattern) = &config.server.allowed_origin_regex {
        eprintln!("  Origin Pattern: {}", style(pattern).cyan());
    }

    eprintln!();
    eprintln!("{}", style("Search Settings:").bold().yellow());
    eprintln!(
        "  Limit: {} (max {})",
        style(config.search.default_limit).cyan(),
        config.search.max_limit
    );
    eprintln!(
        "  Over-fetch Factor: {}",
        style(config.search.over_fetch_factor).cyan()
    );
    eprintln!(
        "  Concurrent Column Queries: {}",
        style(config.search.concurrency).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    let config_dir = Config::config_dir().context("Failed to locate config directory")?;
    Config::load_from(&config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.clone(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_database(database: &mut DatabaseConfig) -> Result<()> {
    let url: String = Input::new()
        .with_prompt("PostgreSQL URL")
        .default(database.url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            DatabaseConfig {
                url: input.clone(),
                ..DatabaseConfig::default()
            }
            .validate()
        })
        .interact_text()?;

    let schema: String = Input::new()
        .with_prompt("Schema holding the tracked tables")
        .default(database.schema.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Schema cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    database.url = url;
    database.schema = schema;

    Ok(())
}

fn configure_gemini(gemini: &mut GeminiConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("Gemini API base URL")
        .default(gemini.base_url.clone())
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(gemini.embedding_model.clone())
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(gemini.chat_model.clone())
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(gemini.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 100 {
                Err("Batch size must be 100 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    gemini.set_base_url(base_url)?;
    gemini.set_embedding_model(embedding_model)?;
    gemini.set_chat_model(chat_model)?;
    gemini.set_batch_size(batch_size)?;

    Ok(())
}

fn test_gemini_connection(gemini: &GeminiConfig) -> bool {
    let Ok(url) = gemini.api_url().map(|base| format!("{}v1beta/models", base)) else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    let api_key = gemini
        .api_key
        .clone()
        .or_else(|| std::env::var(API_KEY_ENV).ok());

    let mut request = agent.get(&url);
    if let Some(key) = &api_key {
        request = request.header("x-goog-api-key", key);
    }

    match request.call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) => (400..500).contains(&code),
        Err(_) => false,
    }
}

/// Human-readable API key status that never reveals the key itself
pub(crate) fn describe_api_key(api_key: Option<&str>) -> String {
    match api_key {
        Some(key) => format!("set ({} characters)", key.chars().count()),
        None => format!("not set (export {})", API_KEY_ENV),
    }
}

/// Replace the password component of a connection URL with `***`
pub(crate) fn redact_password(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("***")).is_ok() {
                url.to_string()
            } else {
                database_url.to_string()
            }
        }
        _ => database_url.to_string(),
    }
}
