//! TOML-based configuration for sqlpilot.
//!
//! Supports a config file (sqlpilot.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! schema_cache_ttl_hours = 24
//! preload_tables = ["orders", "users"]
//!
//! [database]
//! name = "./data/shop.db"
//! user = "reporting"
//! password = "${SHOP_DB_PASSWORD}"
//! min_pool_size = 1
//! max_pool_size = 10
//! connect_timeout = 10
//! command_timeout = 30
//! max_inactive_connection_lifetime = 300
//! application_tag = "chat-frontend"
//!
//! [services.execution]
//! max_rows = 1000
//! timeout = 30
//! retry_count = 3
//! retry_delay = 1.0
//!
//! [services.hints]
//! large_table_threshold = 10000
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Connection and pool settings.
    pub database: DatabaseSettings,

    /// Per-service settings.
    pub services: ServicesSettings,

    /// Lifetime of cached table metadata and column statistics.
    pub schema_cache_ttl_hours: f64,

    /// Tables introspected at startup.
    pub preload_tables: Vec<String>,

    /// Logging settings (used by the binary).
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            services: ServicesSettings::default(),
            schema_cache_ttl_hours: 24.0,
            preload_tables: Vec::new(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Database connection and pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Server host. Not used by file-based drivers.
    pub host: String,

    /// Server port. Not used by file-based drivers.
    pub port: Option<u16>,

    /// Database name; for SQLite, the database file path.
    pub name: String,

    pub user: Option<String>,

    /// Password (supports ${ENV_VAR} expansion).
    pub password: Option<String>,

    pub min_pool_size: u32,
    pub max_pool_size: u32,

    /// Seconds to wait for a new connection or a free pool slot.
    pub connect_timeout: f64,

    /// Seconds a statement may wait on a locked database.
    pub command_timeout: f64,

    /// Seconds an idle connection may sit in the pool before it is replaced.
    pub max_inactive_connection_lifetime: f64,

    /// Tag attached to connection log lines.
    pub application_tag: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            name: "sqlpilot.db".to_string(),
            user: None,
            password: None,
            min_pool_size: 1,
            max_pool_size: 10,
            connect_timeout: 10.0,
            command_timeout: 30.0,
            max_inactive_connection_lifetime: 300.0,
            application_tag: "sqlpilot".to_string(),
        }
    }
}

impl DatabaseSettings {
    /// Settings for a database file with defaults for everything else.
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            name: path.into(),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        seconds(self.connect_timeout)
    }

    pub fn command_timeout(&self) -> Duration {
        seconds(self.command_timeout)
    }

    pub fn max_inactive_lifetime(&self) -> Duration {
        seconds(self.max_inactive_connection_lifetime)
    }

    /// Get the password with environment variables expanded.
    pub fn resolved_password(&self) -> Result<Option<String>, SettingsError> {
        self.password.as_deref().map(expand_env_vars).transpose()
    }

    /// Connection description safe for logs (password never included).
    pub fn redacted_dsn(&self) -> String {
        let user = match (&self.user, &self.password) {
            (Some(user), Some(_)) => format!("{}:***@", user),
            (Some(user), None) => format!("{}@", user),
            _ => String::new(),
        };
        let port = self.port.map(|p| format!(":{}", p)).unwrap_or_default();
        format!(
            "{}{}{}/{} ({})",
            user, self.host, port, self.name, self.application_tag
        )
    }
}

/// Per-service settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesSettings {
    pub execution: ExecutionSettings,
    pub hints: HintSettings,
}

/// Query execution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Row cap applied by `execute_sql` when the caller gives none.
    pub max_rows: Option<usize>,

    /// Default statement timeout in seconds.
    pub timeout: f64,

    /// Extra attempts after a transient failure.
    pub retry_count: u32,

    /// Seconds to wait between attempts.
    pub retry_delay: f64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_rows: Some(1000),
            timeout: 30.0,
            retry_count: 3,
            retry_delay: 1.0,
        }
    }
}

impl ExecutionSettings {
    pub fn timeout(&self) -> Duration {
        seconds(self.timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        seconds(self.retry_delay)
    }
}

/// Query hint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HintSettings {
    /// Row-count estimate above which unpaginated queries are flagged.
    pub large_table_threshold: i64,

    /// Column count above which `SELECT *` is flagged.
    pub wide_table_columns: usize,
}

impl Default for HintSettings {
    fn default() -> Self {
        Self {
            large_table_threshold: 10_000,
            wide_table_columns: 10,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `SQLPILOT_CONFIG`
    /// 2. `./sqlpilot.toml`
    /// 3. `~/.config/sqlpilot/config.toml`
    ///
    /// Environment overrides are applied and the result is validated.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = Self::load_file()?;
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    fn load_file() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("SQLPILOT_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("sqlpilot.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sqlpilot").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Apply `SQLPILOT_DB_*` environment overrides to the database section.
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        let db = &mut self.database;
        if let Ok(host) = env::var("SQLPILOT_DB_HOST") {
            db.host = host;
        }
        if let Ok(port) = env::var("SQLPILOT_DB_PORT") {
            let port = port
                .parse()
                .map_err(|_| SettingsError::InvalidConfig(format!("invalid port: {}", port)))?;
            db.port = Some(port);
        }
        if let Ok(name) = env::var("SQLPILOT_DB_NAME") {
            db.name = name;
        }
        if let Ok(user) = env::var("SQLPILOT_DB_USER") {
            db.user = Some(user);
        }
        if let Ok(password) = env::var("SQLPILOT_DB_PASSWORD") {
            db.password = Some(password);
        }
        Ok(())
    }

    /// Check that pool sizes, timeouts and the cache TTL are usable.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let db = &self.database;
        if db.max_pool_size == 0 {
            return Err(invalid("database.max_pool_size must be at least 1"));
        }
        if db.min_pool_size > db.max_pool_size {
            return Err(invalid(format!(
                "database.min_pool_size ({}) exceeds max_pool_size ({})",
                db.min_pool_size, db.max_pool_size
            )));
        }
        if db.name.trim().is_empty() {
            return Err(invalid("database.name must not be empty"));
        }
        for (key, value) in [
            ("database.connect_timeout", db.connect_timeout),
            ("database.command_timeout", db.command_timeout),
            ("database.max_inactive_connection_lifetime", db.max_inactive_connection_lifetime),
            ("services.execution.timeout", self.services.execution.timeout),
            ("schema_cache_ttl_hours", self.schema_cache_ttl_hours),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("{} must be a positive number", key)));
            }
        }
        let delay = self.services.execution.retry_delay;
        if !(delay.is_finite() && delay >= 0.0) {
            return Err(invalid("services.execution.retry_delay must not be negative"));
        }
        if self.services.execution.max_rows == Some(0) {
            return Err(invalid("services.execution.max_rows must be at least 1"));
        }
        Ok(())
    }

    /// Lifetime of cache entries.
    pub fn cache_ttl(&self) -> Duration {
        seconds(self.schema_cache_ttl_hours * 3600.0)
    }
}

fn invalid(message: impl Into<String>) -> SettingsError {
    SettingsError::InvalidConfig(message.into())
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name = if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut name = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                name.push(ch);
            }
            name
        } else {
            // $VAR ends at non-alphanumeric/underscore
            let mut name = String::new();
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                name.push(ch);
                chars.next();
            }
            if name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
