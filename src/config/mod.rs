use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{BreakerError, Result};
use crate::request::OutboundRequest;
use http::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration of the probe binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakwaterConfig {
    /// Breaker thresholds
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    /// Event queue
    #[serde(default)]
    pub events: EventsConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Dependency to call through the breaker
    #[serde(default)]
    pub target: Option<TargetConfig>,
    /// Probe loop
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// Event queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Queue capacity; 0 disables event publication
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

/// Outbound call target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Dependency URL
    pub url: String,
    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,
    /// Headers sent with every call
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request body
    #[serde(default)]
    pub body: Option<String>,
    /// Statuses counted as success (if empty, any status below 400)
    #[serde(default)]
    pub allowed_status: Vec<u16>,
    /// Per-call timeout in milliseconds
    #[serde(default = "default_target_timeout")]
    pub timeout_ms: u64,
}

/// Probe loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Number of calls to make
    #[serde(default = "default_probe_calls")]
    pub calls: u32,
    /// Pause between calls in milliseconds
    #[serde(default = "default_probe_interval")]
    pub interval_ms: u64,
    /// Body served by the fallback while the breaker is open
    #[serde(default = "default_fallback_body")]
    pub fallback_body: String,
}

fn default_event_capacity() -> usize {
    64
}

fn default_log_filter() -> String {
    "breakwater=info".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_target_timeout() -> u64 {
    30_000
}

fn default_probe_calls() -> u32 {
    10
}

fn default_probe_interval() -> u64 {
    1_000
}

fn default_fallback_body() -> String {
    "fallback".to_string()
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            calls: default_probe_calls(),
            interval_ms: default_probe_interval(),
            fallback_body: default_fallback_body(),
        }
    }
}

impl ProbeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl TargetConfig {
    /// Build the outbound request described by this target
    pub fn to_request(&self) -> Result<OutboundRequest> {
        let method = Method::from_bytes(self.method.to_uppercase().as_bytes()).map_err(|_| {
            BreakerError::Config(format!("Invalid HTTP method '{}' for target", self.method))
        })?;

        let mut request = OutboundRequest::new(method, self.url.clone())
            .timeout(Duration::from_millis(self.timeout_ms));

        for (name, value) in &self.headers {
            request = request.header(name, value)?;
        }
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }
        if !self.allowed_status.is_empty() {
            request = request.allowed_status(self.allowed_status.clone());
        }

        Ok(request)
    }
}

impl BreakwaterConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BreakerError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| BreakerError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.breaker.validate()?;

        if self.probe.interval_ms == 0 {
            return Err(BreakerError::Config(
                "Probe interval_ms must be > 0".to_string(),
            ));
        }

        if let Some(target) = &self.target {
            if !target.url.starts_with("http://") && !target.url.starts_with("https://") {
                return Err(BreakerError::Config(format!(
                    "Target URL must start with http:// or https://: {}",
                    target.url
                )));
            }

            if target.timeout_ms == 0 {
                return Err(BreakerError::Config(
                    "Target timeout_ms must be > 0".to_string(),
                ));
            }

            // Surfaces bad methods and headers at load time
            target.to_request()?.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
breaker:
  fail_threshold: 2
  health_check_period_ms: 5000

events:
  capacity: 8

logging:
  format: json

target:
  url: "http://localhost:3000/health"
  method: post
  headers:
    x-api-key: "secret"
  body: "{}"
  allowed_status: [200, 204]
  timeout_ms: 500

probe:
  calls: 3
  interval_ms: 250
"#;

        let config = BreakwaterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.breaker.fail_threshold, 2);
        assert_eq!(config.breaker.health_check_period_ms, 5000);
        assert_eq!(config.breaker.max_half_open_probes, 1);
        assert_eq!(config.events.capacity, 8);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter, "breakwater=info");
        assert_eq!(config.probe.calls, 3);
        assert_eq!(config.probe.interval(), Duration::from_millis(250));
        assert_eq!(config.probe.fallback_body, "fallback");
        assert!(config.validate().is_ok());

        let request = config.target.unwrap().to_request().unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.allowed(), Some(&[200, 204][..]));
        assert_eq!(request.deadline(), Duration::from_millis(500));
        assert_eq!(request.header_map()["x-api-key"], "secret");
        assert_eq!(request.body_bytes().unwrap().as_ref(), b"{}");
    }

    #[test]
    fn test_default_values() {
        let config = BreakwaterConfig::from_yaml("{}").unwrap();
        assert_eq!(config.breaker.fail_threshold, 5);
        assert_eq!(config.breaker.health_check_period_ms, 15_000);
        assert_eq!(config.events.capacity, 64);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.target.is_none());
        assert_eq!(config.probe.calls, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_threshold() {
        let config = BreakwaterConfig::from_yaml("breaker:\n  fail_threshold: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(BreakerError::Config(_))));
    }

    #[test]
    fn test_validate_zero_interval() {
        let config = BreakwaterConfig::from_yaml("probe:\n  interval_ms: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(BreakerError::Config(_))));
    }

    #[test]
    fn test_validate_invalid_target_url() {
        let config = BreakwaterConfig::from_yaml("target:\n  url: \"localhost:3000\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_method() {
        let config = BreakwaterConfig::from_yaml(
            "target:\n  url: \"http://localhost:3000\"\n  method: \"NOT A METHOD\"\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        let err = BreakwaterConfig::from_yaml("breaker: [1, 2").unwrap_err();
        assert!(matches!(err, BreakerError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "breaker:\n  fail_threshold: 4").unwrap();

        let config = BreakwaterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.breaker.fail_threshold, 4);

        assert!(BreakwaterConfig::from_file("/nonexistent/breakwater.yaml").is_err());
    }
}
