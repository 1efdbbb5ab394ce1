use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "postgres://localhost/dray".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Trailing window, in minutes, that an assignment counts against
    /// an agent's capacity
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    /// Upper bound for waiting on the per-order and per-agent locks
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_window_minutes() -> i64 {
    30
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Largest accepted availability window: one week, in minutes.
const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("database.url", default_database_url())?
            .set_default("database.max_connections", 5)?
            .set_default("dispatch.window_minutes", 30)?
            .set_default("dispatch.lock_timeout_ms", 5000)?
            .set_default("logging.level", "info")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DRAY_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (DRAY_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("DRAY")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.is_empty() {
            errors.push("database.url must not be empty".to_string());
        }

        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be at least 1".to_string());
        }

        if self.dispatch.window_minutes <= 0 {
            errors.push("dispatch.window_minutes must be positive".to_string());
        } else if self.dispatch.window_minutes > MAX_WINDOW_MINUTES {
            errors.push(format!(
                "dispatch.window_minutes must be at most {} (one week)",
                MAX_WINDOW_MINUTES
            ));
        }

        if self.dispatch.lock_timeout_ms == 0 {
            errors.push("dispatch.lock_timeout_ms must be positive".to_string());
        }

        let level = self.logging.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            errors.push(format!("logging.level '{}' is not a valid level", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.window_minutes, 30);
        assert_eq!(config.dispatch.lock_timeout_ms, 5000);
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let config = AppConfig {
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 0,
            },
            dispatch: DispatchConfig {
                window_minutes: 0,
                lock_timeout_ms: 0,
            },
            logging: LoggingConfig {
                level: "loud".to_string(),
            },
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn test_validate_rejects_oversized_window() {
        // i64::MAX minutes would panic inside chrono's Duration math at
        // engine construction; validation has to catch it first.
        let config = AppConfig {
            dispatch: DispatchConfig {
                window_minutes: i64::MAX,
                ..DispatchConfig::default()
            },
            ..AppConfig::default_config()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("window_minutes"), "got: {}", errors[0]);
    }
}
