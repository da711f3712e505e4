//! Configuration module for sqlpilot.
//!
//! Handles the TOML settings file, environment variable expansion and
//! per-connection environment overrides.

mod settings;

pub use settings::{
    expand_env_vars, DatabaseSettings, ExecutionSettings, HintSettings, LoggingSettings,
    ServicesSettings, Settings, SettingsError,
};
