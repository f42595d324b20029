use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Service name reported on the health endpoint
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Base URL of the application API (document store + access checks)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL of the identity provider
    #[serde(default = "default_identity_base_url")]
    pub identity_base_url: String,

    /// Shared secret sent to the application API on every store call
    pub server_secret: Option<String>,

    /// Quiet period after the last edit before a document is auto-saved
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,

    /// Upper bound on how long a save may be deferred while edits keep
    /// arriving, measured from the first unsaved edit
    #[serde(default = "default_save_max_wait_ms")]
    pub save_max_wait_ms: u64,

    /// Timeout for outbound identity/store calls; a timed-out admission call
    /// is treated as denial
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn save_max_wait(&self) -> Duration {
        Duration::from_millis(self.save_max_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            service_name: default_service_name(),
            api_base_url: default_api_base_url(),
            identity_base_url: default_identity_base_url(),
            server_secret: None,
            save_debounce_ms: default_save_debounce_ms(),
            save_max_wait_ms: default_save_max_wait_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "cosync-doc".to_string()
}

fn default_api_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_identity_base_url() -> String {
    "http://localhost:3000/api/auth".to_string()
}

fn default_save_debounce_ms() -> u64 {
    30_000
}

fn default_save_max_wait_ms() -> u64 {
    120_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}
