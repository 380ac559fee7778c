// Configuration management module
// TOML file in the config directory, overlaid with environment-provided settings

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, DatabaseConfig, GeminiConfig, IndexingConfig, SearchConfig, ServerConfig,
};
