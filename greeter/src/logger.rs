//! Logger setup
//!
//! The log4rs configuration is read from the YAML file named by
//! `LOG_CONFIG`. When that file can't be used, a console-only configuration
//! is installed instead so the client never runs silent.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use snafu::prelude::Snafu;

/// Pattern used by the fallback console logger
const CONSOLE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} | {h({l}):5.5} | {t} | {m}{n}";

/// Custom Error type for logger errors
#[derive(Debug, Snafu, Clone, PartialEq)]
pub enum LoggerError {
    /// Could not build the fallback configuration
    #[snafu(display("Could not build console logger configuration: {reason}"))]
    CouldNotConfigure {
        /// underlying error message
        reason: String,
    },

    /// A logger was already installed
    #[snafu(display("Could not install logger: {reason}"))]
    CouldNotInstall {
        /// underlying error message
        reason: String,
    },
}

/// Console-only log4rs configuration
pub fn console_config() -> Result<LogConfig, LoggerError> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();

    LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .map_err(|e| LoggerError::CouldNotConfigure {
            reason: e.to_string(),
        })
}

/// Install the global logger described by the YAML file at `log_cfg`
#[cfg(not(tarpaulin_include))]
// no_coverage: installs a process wide logger
pub fn init_logger(log_cfg: &str) -> Result<(), LoggerError> {
    let (log_config, load_error) =
        match log4rs::config::load_config_file(log_cfg, Default::default()) {
            Ok(log_config) => (log_config, None),
            Err(e) => (console_config()?, Some(e)),
        };

    log4rs::init_config(log_config).map_err(|e| LoggerError::CouldNotInstall {
        reason: e.to_string(),
    })?;

    if let Some(e) = load_error {
        log::warn!(
            "(logger) could not parse {}: {}. Logging to console only.",
            log_cfg,
            e
        );
    }

    Ok(())
}
