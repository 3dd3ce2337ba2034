use serde::{Deserialize, Serialize};

use std::{env, fs, path::Path, time::Duration};

/// Upper bound for `max_ttl_minutes`: one year.
pub const TTL_CEILING_MINUTES: i64 = 365 * 24 * 60;

const CONFIG_ENV: &str = "BURN_NOTES_CONFIG";
const ENV_PREFIX: &str = "BURN_NOTES_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerBackend {
    Local,
    Http,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix of the shareable links handed out on creation.
    pub base_url: String,
    #[serde(default = "default_ttl_minutes")]
    pub default_ttl_minutes: i64,
    #[serde(default = "default_max_ttl_minutes")]
    pub max_ttl_minutes: i64,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub bot_guard: BotGuardConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub backend: SchedulerBackend,
    /// Base URL of the external scheduling service.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Where fired jobs are delivered. Defaults to `{base_url}/cleanup`.
    #[serde(default)]
    pub cleanup_url: Option<String>,
    #[serde(with = "humantime_serde", default = "default_scheduler_timeout")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotGuardConfig {
    #[serde(default)]
    pub extra_signatures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Serve `GET /notes/{id}`, which destroys the note without checking
    /// the password.
    pub allow_unverified_read: bool,
}

const fn default_port() -> u16 {
    8000
}

const fn default_ttl_minutes() -> i64 {
    60
}

const fn default_max_ttl_minutes() -> i64 {
    7 * 24 * 60
}

const fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

const fn default_scheduler_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            dsn: None,
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backend: SchedulerBackend::Local,
            endpoint: None,
            cleanup_url: None,
            timeout: default_scheduler_timeout(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            allow_unverified_read: true,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "default_ttl_minutes must be positive".to_string(),
            ));
        }
        if self.default_ttl_minutes > self.max_ttl_minutes {
            return Err(ConfigError::Invalid(format!(
                "default_ttl_minutes ({}) exceeds max_ttl_minutes ({})",
                self.default_ttl_minutes, self.max_ttl_minutes
            )));
        }
        if self.max_ttl_minutes > TTL_CEILING_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "max_ttl_minutes ({}) exceeds the limit of {} minutes",
                self.max_ttl_minutes, TTL_CEILING_MINUTES
            )));
        }
        if self.store.backend == StoreBackend::Postgres && self.store.dsn.is_none() {
            return Err(ConfigError::Invalid(
                "store.dsn is required for the postgres backend".to_string(),
            ));
        }
        if self.scheduler.backend == SchedulerBackend::Http && self.scheduler.endpoint.is_none() {
            return Err(ConfigError::Invalid(
                "scheduler.endpoint is required for the http backend".to_string(),
            ));
        }
        if self.store.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "store.sweep_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cleanup_url(&self) -> String {
        self.scheduler.cleanup_url.clone().unwrap_or_else(|| {
            format!("{}/cleanup", self.base_url.trim_end_matches('/'))
        })
    }
}

/// Flat mirror of [`Config`] for `BURN_NOTES_*` variables.
#[derive(Debug, Deserialize)]
struct EnvConfig {
    #[serde(default = "default_port")]
    port: u16,
    base_url: String,
    #[serde(default = "default_ttl_minutes")]
    default_ttl_minutes: i64,
    #[serde(default = "default_max_ttl_minutes")]
    max_ttl_minutes: i64,
    store_backend: Option<StoreBackend>,
    store_dsn: Option<String>,
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    sweep_interval: Duration,
    scheduler_backend: Option<SchedulerBackend>,
    scheduler_endpoint: Option<String>,
    scheduler_cleanup_url: Option<String>,
    #[serde(with = "humantime_serde", default = "default_scheduler_timeout")]
    scheduler_timeout: Duration,
    cors_allowed_origins: Option<Vec<String>>,
    #[serde(default)]
    bot_signatures: Vec<String>,
    allow_unverified_read: Option<bool>,
}

impl From<EnvConfig> for Config {
    fn from(env: EnvConfig) -> Self {
        Self {
            port: env.port,
            base_url: env.base_url,
            default_ttl_minutes: env.default_ttl_minutes,
            max_ttl_minutes: env.max_ttl_minutes,
            store: StoreConfig {
                backend: env.store_backend.unwrap_or(StoreBackend::Memory),
                dsn: env.store_dsn,
                sweep_interval: env.sweep_interval,
            },
            scheduler: SchedulerConfig {
                backend: env.scheduler_backend.unwrap_or(SchedulerBackend::Local),
                endpoint: env.scheduler_endpoint,
                cleanup_url: env.scheduler_cleanup_url,
                timeout: env.scheduler_timeout,
            },
            cors: env
                .cors_allowed_origins
                .map_or_else(CorsConfig::default, |allowed_origins| CorsConfig {
                    allowed_origins,
                }),
            bot_guard: BotGuardConfig {
                extra_signatures: env.bot_signatures,
            },
            retrieval: RetrievalConfig {
                allow_unverified_read: env.allow_unverified_read.unwrap_or(true),
            },
        }
    }
}

fn load_from_env() -> Result<Config, ConfigError> {
    let env_config: EnvConfig = envy::prefixed(ENV_PREFIX).from_env()?;
    Ok(env_config.into())
}

fn load_from_file(path: &str) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

fn locate_config() -> Result<Config, ConfigError> {
    // Retrieve env variable
    let config_path = env::var(CONFIG_ENV).unwrap_or_else(|_| "config.yaml".to_string());

    // Try env path
    if Path::new(&config_path).exists() {
        return load_from_file(&config_path);
    }

    // Fallback to config.yaml
    if Path::new("config.yaml").exists() {
        tracing::warn!(
            "Config file '{}' not found, falling back to 'config.yaml'",
            config_path
        );
        return load_from_file("config.yaml");
    }

    // Fallback to config.example.yaml
    if Path::new("config.example.yaml").exists() {
        tracing::warn!(
            "Config file '{}' and 'config.yaml' not found, falling back to 'config.example.yaml'\
             \n This file should not be used and should be replaced with actual data",
            config_path
        );
        return load_from_file("config.example.yaml");
    }

    // Fallback to environment variables
    tracing::info!(
        "No config file found, attempting to load configuration from environment variables"
    );
    load_from_env().map_err(|e| {
        ConfigError::Invalid(format!(
            "config file not found and environment variables are incomplete. \
             Tried: '{config_path}', 'config.yaml', 'config.example.yaml', and {ENV_PREFIX}* variables. \
             Error: {e}"
        ))
    })
}

pub fn load_config() -> Result<Config, ConfigError> {
    let config = locate_config()?;
    config.validate()?;
    Ok(config)
}
