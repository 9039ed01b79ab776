use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Embedding vector width shared by the store indexes, the startup probe
/// and every upsert.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// Application configuration loaded from files and environment variables.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    pub surrealdb_address: String,
    #[serde(default)]
    pub surrealdb_username: String,
    #[serde(default)]
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
}

/// Default base URL used for OpenAI-compatible APIs.
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> usize {
    DEFAULT_EMBEDDING_DIMENSIONS
}

/// Constructor-level knobs shared by the repositories and services.
#[derive(Clone, Copy, Debug)]
pub struct RagConfig {
    pub embedding_dimensions: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

/// Loads the application configuration from the environment and optional config file.
#[allow(clippy::module_name_repetitions)]
pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
