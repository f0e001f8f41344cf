pub mod loader;

use serde::{Deserialize, Serialize};

use crate::error::ReportsError;

pub const DEFAULT_CONFIG_FILE: &str = "sgod-reports";
pub const ENV_PREFIX: &str = "SGOD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Prefix for links placed in notification emails. Empty keeps links relative.
    #[serde(default)]
    pub site_url: String,
    pub notifications: NotificationConfig,
    pub dashboards: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub dispatch_interval_secs: u64,
    pub batch_limit: i64,
    pub retry_failed: bool,
    pub max_retries: i64,
    /// When unset, emails are written to the log instead of being relayed.
    #[serde(default)]
    pub relay_url: Option<String>,
    pub relay_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub cache_ttl_secs: u64,
}

impl AppConfig {
    /// Load configuration from defaults, `sgod-reports.toml` (optional) and
    /// `SGOD__*` environment variables, in that order of precedence.
    pub fn load() -> Result<Self, ReportsError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(file_stem: &str) -> Result<Self, ReportsError> {
        let settings = Self::builder()?
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ReportsError::Config(format!("Failed to build configuration: {}", e)))?;

        let app_config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| ReportsError::Config(format!("Invalid configuration: {}", e)))?;

        app_config.validate()?;
        Ok(app_config)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ReportsError> {
        let defaults = config::Config::builder()
            .set_default("database_url", "sqlite://sgod_reports.db?mode=rwc")?
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 3000_i64)?
            .set_default("site_url", "")?
            .set_default("notifications.enabled", true)?
            .set_default("notifications.dispatch_interval_secs", 60_i64)?
            .set_default("notifications.batch_limit", 50_i64)?
            .set_default("notifications.retry_failed", false)?
            .set_default("notifications.max_retries", 3_i64)?
            .set_default("notifications.relay_timeout_secs", 15_i64)?
            .set_default("dashboards.cache_ttl_secs", 300_i64)?;
        Ok(defaults)
    }

    pub fn validate(&self) -> Result<(), ReportsError> {
        if self.database_url.trim().is_empty() {
            return Err(ReportsError::Config("database_url must not be empty".to_string()));
        }
        if self.notifications.dispatch_interval_secs == 0 {
            return Err(ReportsError::Config(
                "notifications.dispatch_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.notifications.relay_timeout_secs == 0 {
            return Err(ReportsError::Config(
                "notifications.relay_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.notifications.batch_limit <= 0 {
            return Err(ReportsError::Config(format!(
                "notifications.batch_limit ({}) must be positive",
                self.notifications.batch_limit
            )));
        }
        if let Some(url) = &self.notifications.relay_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ReportsError::Config(format!(
                    "notifications.relay_url must be an http(s) URL, got {}",
                    url
                )));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn to_toml(&self) -> Result<String, ReportsError> {
        toml::to_string_pretty(self)
            .map_err(|e| ReportsError::Config(format!("Failed to render configuration: {}", e)))
    }
}

impl From<config::ConfigError> for ReportsError {
    fn from(err: config::ConfigError) -> Self {
        ReportsError::Config(err.to_string())
    }
}
