//! Configuration, paths, and logging setup for txno.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, OutboxSettings, DEFAULT_DIALECT, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, LogFormat};
pub use paths::Paths;
