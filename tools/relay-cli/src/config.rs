//! CLI configuration.

use anyhow::{Context, Result};
use relay_gateway::GatewayConfig;
use relay_observability::LogFormat;
use serde::{Deserialize, Serialize};

/// CLI configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Gateway defaults and limits.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::parse(path, &content)
    }

    /// Parse config content, choosing the format from the file extension.
    pub fn parse(path: &str, content: &str) -> Result<Self> {
        if path.ends_with(".json") {
            serde_json::from_str(content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            toml::from_str(content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
        }
    }
}

/// Generate a default relay.toml config file.
pub fn generate_default_config() -> String {
    r#"# Relay gateway configuration

[gateway]
# default_timeout_ms = 2000
default_delay_ms = 1000
default_provider_count = 3
max_provider_count = 16
default_days = 5
max_iterations = 365
policy = "best-effort"
min_successes = 1
# provider_base_url = "http://localhost:8080"

[logging]
format = "human"
filter = "info"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_gateway::AggregationPolicy;

    #[test]
    fn test_generated_config_parses() {
        let config = CliConfig::parse("relay.toml", &generate_default_config()).unwrap();

        assert_eq!(config.gateway, GatewayConfig::default());
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_json_config() {
        let config = CliConfig::parse(
            "relay.json",
            r#"{ "gateway": { "policy": "fail-fast" }, "logging": { "format": "json" } }"#,
        )
        .unwrap();

        assert_eq!(config.gateway.policy, AggregationPolicy::FailFast);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
