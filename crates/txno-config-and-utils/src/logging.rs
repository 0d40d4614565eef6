//! Logging initialization.
//!
//! Installs a `tracing-subscriber` fmt subscriber on stderr. `RUST_LOG`
//! takes precedence over the configured level. Set `TXNO_LOG_FORMAT=json`
//! for one JSON object per line.

use std::io;
use tracing_subscriber::EnvFilter;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Read the format from `TXNO_LOG_FORMAT`.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("TXNO_LOG_FORMAT").ok().as_deref())
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") | Some("jsonl") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Initialize logging.
///
/// # Example
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("Outbox started");
/// ```
pub fn init_logging(level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.trim()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(io::stderr);

    match LogFormat::from_env() {
        LogFormat::Json => builder.json().with_current_span(true).init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse(None), LogFormat::Compact);
        assert_eq!(LogFormat::parse(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" jsonl ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Compact);
    }
}
