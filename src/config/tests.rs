use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let mut original_config = Config::default();
        original_config.database.url = "postgresql://reader@db:5432/walk".to_string();
        original_config.gemini.chat_model = "gemini-2.0-pro".to_string();
        original_config.server.allowed_origins = vec!["http://localhost:4000".to_string()];

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [database
            url = "postgresql://localhost"
            max_connections = "many"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn wrongly_typed_field_is_rejected() {
        let invalid_toml = r#"
            [server]
            port = "eighty"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn complete_valid_config() {
        let valid_toml = r#"
            [database]
            url = "postgresql://localhost:5432/walkative_local"
            schema = "main"
            max_connections = 4
            acquire_timeout_seconds = 5
            statement_timeout_seconds = 20

            [gemini]
            base_url = "https://generativelanguage.googleapis.com"
            embedding_model = "text-embedding-004"
            chat_model = "gemini-2.5-flash"
            embedding_dimension = 768
            batch_size = 8
            timeout_seconds = 45
            retry_attempts = 2

            [server]
            host = "0.0.0.0"
            port = 8080
            allowed_origins = ["http://localhost:5173"]
            allowed_origin_regex = '^https://.*\.usercontent\.goog$'

            [search]
            default_limit = 5
            max_limit = 20
            over_fetch_factor = 3
            column_timeout_seconds = 5
            concurrency = 2

            [indexing]
            text_column_patterns = ["content", "summary"]
            rows_per_batch = 500
            max_document_chars = 10000
            request_delay_ms = 0
        "#;

        let config: Config = toml::from_str(valid_toml).expect("should parse toml successfully");
        assert!(config.validate().is_ok());
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.gemini.batch_size, 8);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.search.over_fetch_factor, 3);
        assert_eq!(
            config.indexing.text_column_patterns,
            vec!["content".to_string(), "summary".to_string()]
        );
    }

    #[test]
    fn default_origins_cover_local_development() {
        let server = ServerConfig::default();
        for origin in ["http://localhost:5173", "http://127.0.0.1:3000"] {
            assert!(server.allowed_origins.iter().any(|o| o == origin));
        }
        assert!(server.allowed_origin_regex.is_some());
    }
}
