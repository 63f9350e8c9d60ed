//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the interceptor.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the interceptor.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Listener configuration (port, bind host, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Backend liveness monitoring.
    pub health: HealthConfig,

    /// Capture queue settings.
    pub capture: CaptureConfig,

    /// Observer connection settings.
    pub observers: ObserverConfig,

    /// Public tunnel settings.
    pub tunnel: TunnelConfig,

    /// Inspector UI asset settings.
    pub ui: UiConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Port the interceptor listens on. Also the port shared through the tunnel.
    pub port: u16,

    /// Host/interface to bind (e.g., "0.0.0.0").
    pub bind_host: String,

    /// Inbound request body limit. Captured response bodies are cut to it.
    pub max_body_bytes: usize,
}

impl ListenerConfig {
    /// Full bind address, e.g. "0.0.0.0:4040".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 4040,
            bind_host: "0.0.0.0".to_string(),
            max_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Proxied request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Reachability probe (TCP dial) timeout in seconds.
    pub probe_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            probe_secs: 2,
        }
    }
}

/// Backend liveness monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Probe interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

/// What the capture queue does when the broadcaster falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest unread capture; the proxy never waits.
    #[default]
    DropOldest,
    /// Wait for room in the queue before returning the proxied response.
    Block,
}

/// Capture queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Number of unread captures the queue holds.
    pub queue_capacity: usize,

    /// Overflow behaviour when the queue is full.
    pub overflow: OverflowPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

/// Observer (websocket) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Interval between keep-alive pings in seconds.
    pub keepalive_secs: u64,

    /// Seconds a single frame write may take before the observer is dropped.
    pub write_timeout_secs: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: 30,
            write_timeout_secs: 10,
        }
    }
}

/// Public tunnel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Start a tunnel session on every successful configure.
    pub enabled: bool,

    /// Tunnel tool name (looked up on PATH) or absolute path.
    pub binary: String,

    /// Provider domain public share URLs live under (`https://<label>.share.<domain>`).
    pub share_domain: String,

    /// Seconds to wait for the public URL to appear in the tool output.
    pub url_timeout_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "zrok".to_string(),
            share_domain: "zrok.io".to_string(),
            url_timeout_secs: 30,
        }
    }
}

/// Inspector UI configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UiConfig {
    /// Directory holding the dashboard asset bundle. Inspector pages return
    /// 404 when unset.
    pub static_dir: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_behaviour() {
        let config = InterceptorConfig::default();
        assert_eq!(config.listener.port, 4040);
        assert_eq!(config.health.interval_secs, 5);
        assert_eq!(config.observers.keepalive_secs, 30);
        assert_eq!(config.observers.write_timeout_secs, 10);
        assert_eq!(config.tunnel.url_timeout_secs, 30);
        assert_eq!(config.capture.queue_capacity, 100);
        assert_eq!(config.capture.overflow, OverflowPolicy::DropOldest);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: InterceptorConfig = toml::from_str(
            r#"
            [listener]
            port = 5050

            [capture]
            overflow = "block"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 5050);
        assert_eq!(config.listener.bind_host, "0.0.0.0");
        assert_eq!(config.capture.overflow, OverflowPolicy::Block);
        assert_eq!(config.tunnel.binary, "zrok");
    }
}
