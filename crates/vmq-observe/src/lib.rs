mod config;
mod error;
mod init;
mod level;
mod timer;

pub use config::{LoggerConfig, LoggerFormat};
pub use error::{LoggerError, LoggerResult};
pub use level::LoggerLevel;

/// Initializes the global tracing subscriber with the given configuration.
///
/// Once initialized, all `tracing` macros (`info!`, `debug!`, etc.) use this
/// configuration. Returns an error when a subscriber was already installed.
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    match cfg.format {
        LoggerFormat::Text => init::logger_text(cfg),
        LoggerFormat::Json => init::logger_json(cfg),
        LoggerFormat::Journald => init::logger_journald(cfg),
    }
}
