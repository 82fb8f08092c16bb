use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing_subscriber::EnvFilter;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_COLUMN_PAGE_SIZE: u64 = 30;
const DEFAULT_BOARD_REFRESH_SECS: u64 = 60;
const DEFAULT_LEGACY_BATCH_LIMIT: u64 = 1000;
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 10;
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Remote backend store settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// "remote" for the HTTP function backend, "memory" for the in-process
    /// development store.
    pub mode: String,

    /// Base URL of the function backend; functions are called under
    /// `<base>/rpc/<name>`.
    pub base_url: String,

    /// Service key attached as `x-api-key` to every backend call.
    pub api_key: Option<String>,

    #[serde(default = "default_backend_timeout")]
    pub request_timeout_secs: u64,

    /// Cap on the legacy full-scan batch. Records beyond the cap are
    /// invisible while running in degraded mode.
    #[serde(default = "default_legacy_batch_limit")]
    pub legacy_batch_limit: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: "memory".to_string(),
            base_url: "http://localhost:9000".to_string(),
            api_key: None,
            request_timeout_secs: default_backend_timeout(),
            legacy_batch_limit: default_legacy_batch_limit(),
        }
    }
}

/// Query cache settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL for cached query results. Chosen to absorb the clients'
    /// steady-interval board re-polling.
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_cache_ttl(),
        }
    }
}

/// Kanban tuning.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct KanbanConfig {
    /// Fixed first-page size of every column.
    #[serde(default = "default_column_page_size")]
    pub column_page_size: u64,

    /// Interval clients are told to re-poll the board at; served as a hint,
    /// polling itself happens client-side.
    #[serde(default = "default_board_refresh")]
    pub refresh_interval_secs: u64,
}

impl Default for KanbanConfig {
    fn default() -> Self {
        Self {
            column_page_size: default_column_page_size(),
            refresh_interval_secs: default_board_refresh(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Secret used to verify session tokens (minimum 64 characters)
    #[validate(length(min = 64))]
    pub jwt_secret: String,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub kanban: KanbanConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_column_page_size() -> u64 {
    DEFAULT_COLUMN_PAGE_SIZE
}

fn default_board_refresh() -> u64 {
    DEFAULT_BOARD_REFRESH_SECS
}

fn default_legacy_batch_limit() -> u64 {
    DEFAULT_LEGACY_BATCH_LIMIT
}

fn default_backend_timeout() -> u64 {
    DEFAULT_BACKEND_TIMEOUT_SECS
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Loads configuration from `config/default`, an environment-specific
/// overlay, and `MEDEQUIP_*` environment variables (`__` as the separator,
/// e.g. `MEDEQUIP_BACKEND__BASE_URL`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("MEDEQUIP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let config: AppConfig = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("environment", run_env.clone())?
        .set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("MEDEQUIP").separator("__"))
        .build()?
        .try_deserialize()?;

    if config.is_production() && config.jwt_secret == DEV_DEFAULT_JWT_SECRET {
        return Err(ConfigError::Message(
            "the development jwt_secret cannot be used in production".to_string(),
        ));
    }
    config
        .validate()
        .map_err(|err| ConfigError::Message(err.to_string()))?;
    Ok(config)
}

/// Initializes the tracing subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init_tracing(log_level: &str, log_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let backend = BackendConfig::default();
        assert_eq!(backend.mode, "memory");
        assert_eq!(backend.legacy_batch_limit, DEFAULT_LEGACY_BATCH_LIMIT);

        let kanban = KanbanConfig::default();
        assert_eq!(kanban.column_page_size, 30);
        assert_eq!(kanban.refresh_interval_secs, 60);
    }

    #[test]
    fn short_jwt_secret_fails_validation() {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            jwt_secret: "too-short".to_string(),
            backend: BackendConfig::default(),
            cache: CacheConfig::default(),
            kanban: KanbanConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
