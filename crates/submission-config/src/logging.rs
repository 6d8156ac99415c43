// ============================================================================
// Logging Configuration
// ============================================================================

use crate::constants::*;
use crate::{env_parse, env_string};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string
    pub rust_log: String,
    pub format: LogFormat,
    /// Max payload bytes copied into rejection and dead-letter logs
    pub payload_excerpt_bytes: usize,
}

impl LoggingConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let format = match std::env::var("LOG_FORMAT") {
            Ok(raw) => raw.parse().map_err(anyhow::Error::msg)?,
            Err(_) => LogFormat::Pretty,
        };

        Ok(Self {
            rust_log: env_string("RUST_LOG", DEFAULT_RUST_LOG),
            format,
            payload_excerpt_bytes: env_parse(
                "LOG_PAYLOAD_EXCERPT_BYTES",
                DEFAULT_PAYLOAD_EXCERPT_BYTES,
            ),
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            rust_log: DEFAULT_RUST_LOG.to_string(),
            format: LogFormat::Pretty,
            payload_excerpt_bytes: DEFAULT_PAYLOAD_EXCERPT_BYTES,
        }
    }
}
