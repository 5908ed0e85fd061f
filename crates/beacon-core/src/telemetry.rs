//! Telemetry module for structured logging.

use crate::BeaconResult;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name for log fields.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Whether to emit JSON-formatted logs.
    #[serde(default)]
    pub json_output: bool,

    /// Whether to enable console output.
    #[serde(default = "default_console_output")]
    pub console_output: bool,
}

fn default_service_name() -> String {
    "beacon-jobs".to_string()
}

fn default_console_output() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            json_output: false,
            console_output: default_console_output(),
        }
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// Filtering follows `RUST_LOG` when set, and defaults to `info` with
/// `beacon` crates at `debug` otherwise.
pub fn init_telemetry(config: &TelemetryConfig) -> BeaconResult<()> {
    if !config.console_output {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,beacon=debug"));

    if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }

    tracing::info!(service_name = %config.service_name, "Telemetry initialized");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "beacon-jobs");
        assert!(config.console_output);
        assert!(!config.json_output);
    }
}
