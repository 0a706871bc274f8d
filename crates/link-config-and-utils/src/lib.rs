//! Configuration, paths, errors and logging shared by the bankflow crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, PollingSettings, DEFAULT_LOG_LEVEL, DEFAULT_REDIRECT_URI};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_from_config, log_config, LogConfig};
pub use paths::Paths;
