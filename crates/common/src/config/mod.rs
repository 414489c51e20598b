//! Configuration management for DocQA services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use crate::completion::ChatModel;
use crate::errors::{AppError, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding gateway configuration
    pub embedding: EmbeddingConfig,

    /// Chat-completion gateway configuration
    pub completion: CompletionConfig,

    /// Ingestion batching and retrieval depth
    pub retrieval: RetrievalConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Allowed CORS origins, comma separated. `*` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,

    /// Largest accepted upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Log every statement through sqlx
    #[serde(default)]
    pub sqlx_logging: bool,

    /// Create the schema on start-up when it is missing
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionConfig {
    /// Completion provider: openai, mock
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for the chat-completion service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model used when a question does not name one
    #[serde(default)]
    pub default_model: ChatModel,

    /// Answer budget used when a question does not set one
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Chunks handed to the completion model per question
    #[serde(default = "default_top_k")]
    pub top_k: u64,

    /// Buffered chunks are flushed once the buffer grows past this size
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_enabled")]
    pub json_logging: bool,

    /// Expose Prometheus metrics on /metrics
    #[serde(default = "default_enabled")]
    pub metrics_enabled: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 300 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_cors_origins() -> String { "*".to_string() }
fn default_max_upload_bytes() -> usize { 25 * 1024 * 1024 }
fn default_database_url() -> String { "postgres://localhost/docqa".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_upstream_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_max_tokens() -> u32 { 300 }
fn default_completion_timeout() -> u64 { 60 }
fn default_top_k() -> u64 { 3 }
fn default_flush_threshold() -> usize { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_service_name() -> String { "docqa".to_string() }
fn default_enabled() -> bool { true }

const KNOWN_PROVIDERS: &[&str] = &["openai", "mock"];

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false));

        let mut config = Self::build(builder)?;
        config.apply_openai_key(std::env::var("OPENAI_API_KEY").ok());
        Ok(config)
    }

    /// Layer the APP__ environment on top of `builder` and deserialize.
    ///
    /// e.g. `APP__SERVER__PORT=8081`, `APP__DATABASE__URL=postgres://...`
    fn build(builder: ConfigBuilder<DefaultState>) -> std::result::Result<Self, ConfigError> {
        builder
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Use the conventional `OPENAI_API_KEY` for gateways without their own key.
    fn apply_openai_key(&mut self, key: Option<String>) {
        let Some(key) = key.filter(|k| !k.is_empty()) else {
            return;
        };
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = Some(key.clone());
        }
        if self.completion.api_key.is_none() {
            self.completion.api_key = Some(key);
        }
    }

    /// Reject settings the pipelines cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (section, provider, api_key) in [
            ("embedding", &self.embedding.provider, &self.embedding.api_key),
            ("completion", &self.completion.provider, &self.completion.api_key),
        ] {
            if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
                return Err(AppError::Configuration {
                    message: format!("unknown {} provider '{}'", section, provider),
                });
            }
            if provider == "openai" && api_key.as_deref().map_or(true, str::is_empty) {
                return Err(AppError::Configuration {
                    message: format!("{} provider 'openai' requires an API key", section),
                });
            }
        }

        if self.embedding.dimension == 0 {
            return Err(AppError::Configuration {
                message: "embedding.dimension must be greater than zero".to_string(),
            });
        }
        if self.retrieval.top_k == 0 || self.retrieval.flush_threshold == 0 {
            return Err(AppError::Configuration {
                message: "retrieval.top_k and retrieval.flush_threshold must be greater than zero"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            cors_origins: default_cors_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            sqlx_logging: false,
            run_migrations: default_enabled(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_upstream_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: None,
            default_model: ChatModel::default(),
            default_max_tokens: default_max_tokens(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            flush_threshold: default_flush_threshold(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_enabled(),
            metrics_enabled: default_enabled(),
            service_name: default_service_name(),
        }
    }
}
