#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Environment variable that overrides the data store connection string
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Environment variable holding the embedding/generation service credential
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
/// Environment variable that relocates the configuration directory
pub const CONFIG_DIR_ENV: &str = "COLUMN_RAG_CONFIG_DIR";

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub schema: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub statement_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/postgres".to_string(),
            schema: "main".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 10,
            statement_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub embedding_dimension: u32,
    pub batch_size: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    /// Only ever read from the environment
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            chat_model: "gemini-2.5-flash".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 16,
            timeout_seconds: 30,
            retry_attempts: 3,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub allowed_origin_regex: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let allowed_origins = [
            "http://localhost:3000",
            "http://localhost:5173",
            "http://localhost:8080",
            "http://127.0.0.1:3000",
            "http://127.0.0.1:5173",
            "http://127.0.0.1:8080",
            "https://aistudio.google.com",
            "https://generativelanguage.googleapis.com",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins,
            allowed_origin_regex: Some(r"^https://.*\.usercontent\.goog$".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub over_fetch_factor: usize,
    pub column_timeout_seconds: u64,
    pub concurrency: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            max_limit: 50,
            over_fetch_factor: 2,
            column_timeout_seconds: 15,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexingConfig {
    pub text_column_patterns: Vec<String>,
    pub rows_per_batch: u32,
    pub max_document_chars: usize,
    pub request_delay_ms: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            text_column_patterns: ["content", "description", "body", "text"]
                .into_iter()
                .map(String::from)
                .collect(),
            rows_per_batch: 1000,
            max_document_chars: 20_000,
            request_delay_ms: 100,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid database URL: {0} (must be a postgres:// or postgresql:// URL)")]
    InvalidDatabaseUrl(String),
    #[error("Invalid schema name: {0} (cannot be empty)")]
    InvalidSchema(String),
    #[error("Invalid connection pool size: {0} (must be between 1 and 100)")]
    InvalidPoolSize(u32),
    #[error("Invalid timeout for {0}: must be greater than zero")]
    InvalidTimeout(&'static str),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid batch size: {0} (must be between 1 and 100)")]
    InvalidBatchSize(u32),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid origin regex {0}: {1}")]
    InvalidOriginRegex(String, String),
    #[error("Invalid search limits: default {0}, max {1} (need 1 <= default <= max)")]
    InvalidLimits(usize, usize),
    #[error("Invalid over-fetch factor: {0} (must be at least 1)")]
    InvalidOverFetchFactor(usize),
    #[error("Invalid concurrency: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("No text column patterns configured")]
    NoTextColumnPatterns,
    #[error("Invalid rows per batch: {0} (must be between 1 and 100000)")]
    InvalidRowsPerBatch(u32),
    #[error("Invalid max document length: {0} (must be at least 1 character)")]
    InvalidDocumentLength(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Directory holding `config.toml`, honouring `COLUMN_RAG_CONFIG_DIR`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }

        dirs::home_dir()
            .map(|home| home.join(".column-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("column-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from the default config directory and apply environment overrides
    #[inline]
    pub fn load() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to locate config directory")?;
        let mut config = Self::load_from(&config_dir)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
            .validate()
            .context("Configuration validation failed after applying environment")?;
        Ok(config)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults when it is absent
    #[inline]
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Overlay environment-provided settings. Empty values are ignored.
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty(DATABASE_URL_ENV) {
            self.database.url = url;
        }
        if let Some(key) = non_empty(API_KEY_ENV) {
            self.gemini.api_key = Some(key);
        }
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.gemini.validate()?;
        self.server.validate()?;
        self.search.validate()?;
        self.indexing.validate()?;
        Ok(())
    }
}

impl DatabaseConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url =
            Url::parse(&self.url).map_err(|_| ConfigError::InvalidDatabaseUrl(self.url.clone()))?;
        if url.scheme() != "postgres" && url.scheme() != "postgresql" {
            return Err(ConfigError::InvalidDatabaseUrl(self.url.clone()));
        }

        if self.schema.trim().is_empty() {
            return Err(ConfigError::InvalidSchema(self.schema.clone()));
        }

        if !(1..=100).contains(&self.max_connections) {
            return Err(ConfigError::InvalidPoolSize(self.max_connections));
        }

        if self.acquire_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout("connection acquisition"));
        }
        if self.statement_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout("statements"));
        }

        Ok(())
    }
}

impl GeminiConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }
        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=100).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout("service requests"));
        }

        Ok(())
    }

    #[inline]
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }

    #[inline]
    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        let temp_config = GeminiConfig {
            base_url: base_url.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.base_url = base_url;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if !(1..=100).contains(&batch_size) {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl ServerConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        for origin in &self.allowed_origins {
            Url::parse(origin).map_err(|_| ConfigError::InvalidUrl(origin.clone()))?;
        }

        if let Some(pattern) = &self.allowed_origin_regex {
            fancy_regex::Regex::new(pattern)
                .map_err(|e| ConfigError::InvalidOriginRegex(pattern.clone(), e.to_string()))?;
        }

        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }
}

impl SearchConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::InvalidLimits(
                self.default_limit,
                self.max_limit,
            ));
        }

        if self.over_fetch_factor == 0 {
            return Err(ConfigError::InvalidOverFetchFactor(self.over_fetch_factor));
        }

        if self.column_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout("column queries"));
        }

        if !(1..=64).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }

        Ok(())
    }
}

impl IndexingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .text_column_patterns
            .iter()
            .all(|pattern| pattern.trim().is_empty())
        {
            return Err(ConfigError::NoTextColumnPatterns);
        }

        if !(1..=100_000).contains(&self.rows_per_batch) {
            return Err(ConfigError::InvalidRowsPerBatch(self.rows_per_batch));
        }

        if self.max_document_chars == 0 {
            return Err(ConfigError::InvalidDocumentLength(self.max_document_chars));
        }

        Ok(())
    }
}
