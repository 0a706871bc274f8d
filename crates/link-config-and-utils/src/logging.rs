//! Logging initialization.
//!
//! Thin wrapper over the observability crate that feeds it from [`Config`]
//! and [`Paths`].

use crate::{Config, Paths};
pub use observability::LogConfig;

const SERVICE_NAME: &str = "bankflow";

/// Initialize logging at `level`, writing to the default central log file.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str) {
    observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        also_stderr: true,
        ..Default::default()
    });
}

/// Initialize logging from a loaded configuration, writing under `paths`.
///
/// ```ignore
/// let paths = Paths::new()?;
/// let config = Config::load(&paths)?;
/// init_logging_from_config(&config, &paths);
/// ```
pub fn init_logging_from_config(config: &Config, paths: &Paths) {
    observability::init_with_config(log_config(config, paths));
}

/// Logging settings derived from `config`, logging to `paths.log_file()`.
pub fn log_config(config: &Config, paths: &Paths) -> LogConfig {
    LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: config.log_level.clone(),
        log_path: Some(paths.log_file()),
        also_stderr: true,
    }
}
