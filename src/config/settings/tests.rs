use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.database.schema, "main");
    assert_eq!(config.gemini.embedding_model, "text-embedding-004");
    assert_eq!(config.gemini.chat_model, "gemini-2.5-flash");
    assert_eq!(config.gemini.embedding_dimension, 768);
    assert_eq!(config.search.default_limit, 5);
    assert_eq!(config.search.over_fetch_factor, 2);
    assert_eq!(config.server.port, 8000);
    assert!(config.gemini.api_key.is_none());
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.database.url = "mysql://localhost/db".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.database.schema = "  ".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.gemini.embedding_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.gemini.batch_size = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.server.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.search.default_limit = 60;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.search.over_fetch_factor = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.indexing.text_column_patterns = vec![String::new()];
    assert!(invalid_config.validate().is_err());
}

#[test]
fn invalid_origin_regex_is_rejected() {
    let mut config = Config::default();
    config.server.allowed_origin_regex = Some("(unclosed".to_string());

    let error = config.validate().expect_err("regex should be rejected");
    assert!(matches!(error, ConfigError::InvalidOriginRegex(..)));
}

#[test]
fn toml_serialization_skips_api_key() {
    let mut config = Config::default();
    config.gemini.api_key = Some("secret-key".to_string());

    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    assert!(!toml_str.contains("secret-key"));

    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(parsed_config.gemini.api_key, None);
    assert_eq!(parsed_config.database, config.database);
    assert_eq!(parsed_config.search, config.search);
}

#[test]
fn partial_toml_uses_section_defaults() {
    let partial_toml = r#"
        [database]
        schema = "public"

        [search]
        default_limit = 10
    "#;

    let config: Config = toml::from_str(partial_toml).expect("should parse partial toml");
    assert_eq!(config.database.schema, "public");
    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.search.default_limit, 10);
    assert_eq!(config.search.max_limit, 50);
    assert_eq!(config.gemini, GeminiConfig::default());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load_from(temp_dir.path()).expect("defaults load");
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.database, DatabaseConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
fn save_then_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let base_dir = temp_dir.path().join("nested");

    let mut config = Config {
        base_dir: base_dir.clone(),
        ..Config::default()
    };
    config.database.schema = "content".to_string();
    config.search.concurrency = 8;
    config.save().expect("config saves");

    assert!(base_dir.join("config.toml").exists());

    let loaded = Config::load_from(&base_dir).expect("config loads");
    assert_eq!(loaded.database.schema, "content");
    assert_eq!(loaded.search.concurrency, 8);
}

#[test]
fn invalid_file_contents_fail_to_load() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[search]\ndefault_limit = 0\n",
    )
    .expect("write config");

    assert!(Config::load_from(temp_dir.path()).is_err());
}

#[test]
fn env_overrides_apply_database_url_and_key() {
    let mut config = Config::default();
    config.apply_env_overrides(|key| match key {
        DATABASE_URL_ENV => Some("postgresql://app@db.internal:5432/walk".to_string()),
        API_KEY_ENV => Some("abc123".to_string()),
        _ => None,
    });

    assert_eq!(config.database.url, "postgresql://app@db.internal:5432/walk");
    assert_eq!(config.gemini.api_key.as_deref(), Some("abc123"));
}

#[test]
fn empty_env_values_are_ignored() {
    let mut config = Config::default();
    config.apply_env_overrides(|_| Some("   ".to_string()));

    assert_eq!(config.database.url, DatabaseConfig::default().url);
    assert!(config.gemini.api_key.is_none());
}

#[test]
fn setter_validation() {
    let mut gemini = GeminiConfig::default();

    assert!(gemini.set_base_url("http://localhost:9999".to_string()).is_ok());
    assert!(gemini.set_embedding_model("embedding-001".to_string()).is_ok());
    assert!(gemini.set_chat_model("gemini-pro".to_string()).is_ok());
    assert!(gemini.set_batch_size(100).is_ok());
    assert!(gemini.set_embedding_dimension(1536).is_ok());

    assert!(gemini.set_base_url("ftp://example.com".to_string()).is_err());
    assert!(gemini.set_embedding_model("  ".to_string()).is_err());
    assert!(gemini.set_batch_size(101).is_err());
    assert!(gemini.set_embedding_dimension(32).is_err());

    let mut server = ServerConfig::default();
    assert!(server.set_port(9000).is_ok());
    assert!(server.set_port(0).is_err());
}

#[test]
fn error_display_messages() {
    let errors = vec![
        ConfigError::InvalidDatabaseUrl("nope".to_string()),
        ConfigError::InvalidPort(0),
        ConfigError::InvalidBatchSize(0),
        ConfigError::InvalidModel(String::new()),
        ConfigError::InvalidLimits(0, 50),
        ConfigError::InvalidTimeout("statements"),
    ];

    for error in errors {
        let message = format!("{error}");
        assert!(message.len() > 10);
    }
}
