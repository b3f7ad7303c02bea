//! # Config
//!
//! Define and implement config options for module

use crate::grpc::channel::Mode;
use config::{ConfigError, Environment};
use dotenv::dotenv;
use serde::Deserialize;
use std::time::Duration;

/// Environment variables which announce themselves when they fall back to a default
const ANNOUNCED_ENV_VARS: [&str; 2] = ["SERVER", "MODE"];

/// struct holding configuration options
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// address of the Greeter server, or the Kubernetes service in `k8s` mode
    pub server: String,
    /// connection mode, `k8s` enables Kubernetes endpoint discovery
    pub mode: String,
    /// path to log configuration YAML file
    pub log_config: String,
    /// deadline for a single SayHello call
    pub request_timeout_ms: u64,
    /// pause between two SayHello calls
    pub request_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        log::warn!("(Config Default) Creating Config object with default values.");
        Self::new()
    }
}

impl Config {
    /// Default values for Config
    pub fn new() -> Self {
        Config {
            server: String::from("localhost:50051"),
            mode: String::from("k8s"),
            log_config: String::from("log4rs.yaml"),
            request_timeout_ms: 1000,
            request_interval_ms: 2000,
        }
    }

    /// Create a new `Config` object using environment variables
    pub fn try_from_env() -> Result<Self, ConfigError> {
        // read .env file if present
        dotenv().ok();
        let default_config = Config::new();

        for key in ANNOUNCED_ENV_VARS {
            if std::env::var_os(key).is_none() {
                log::warn!("(Config) {} env not set, using default.", key);
            }
        }

        config::Config::builder()
            .set_default("server", default_config.server)?
            .set_default("mode", default_config.mode)?
            .set_default("log_config", default_config.log_config)?
            .set_default("request_timeout_ms", default_config.request_timeout_ms)?
            .set_default("request_interval_ms", default_config.request_interval_ms)?
            .add_source(Environment::default().separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Path of the log configuration file, readable before the rest of the
    /// configuration so that loading it can already be logged.
    pub fn log_config_from_env() -> String {
        dotenv().ok();
        std::env::var("LOG_CONFIG").unwrap_or_else(|_| Config::new().log_config)
    }

    /// Load the configuration from the environment.
    ///
    /// A malformed numeric setting must not cost the user the address and
    /// mode they asked for: the error is logged and only the settings that
    /// failed to parse fall back to their defaults.
    pub fn load() -> Self {
        match Self::try_from_env() {
            Ok(config) => config,
            Err(e) => {
                log::error!("(Config) could not read environment: {}", e);
                Self::from_env_strings()
            }
        }
    }

    /// Defaults overlaid with every environment setting that parses
    fn from_env_strings() -> Self {
        let mut config = Config::new();
        if let Ok(server) = std::env::var("SERVER") {
            config.server = server;
        }
        if let Ok(mode) = std::env::var("MODE") {
            config.mode = mode;
        }
        if let Ok(log_config) = std::env::var("LOG_CONFIG") {
            config.log_config = log_config;
        }

        for (key, value) in [
            ("REQUEST_TIMEOUT_MS", &mut config.request_timeout_ms),
            ("REQUEST_INTERVAL_MS", &mut config.request_interval_ms),
        ] {
            let Ok(raw) = std::env::var(key) else {
                continue;
            };
            match raw.parse::<u64>() {
                Ok(parsed) => *value = parsed,
                Err(_) => log::warn!("(Config) invalid {} '{}', using {}.", key, raw, *value),
            }
        }

        config
    }

    /// Connection mode selected by the `MODE` setting
    pub fn mode(&self) -> Mode {
        Mode::from(self.mode.as_str())
    }

    /// Deadline for a single request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Pause between two requests
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }
}
