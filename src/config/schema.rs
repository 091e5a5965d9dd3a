//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host adapter listener (bind address, document root).
    pub listener: ListenerConfig,

    /// Application-server endpoints requests are forwarded to.
    pub backends: Vec<BackendConfig>,

    /// Connection pool behaviour.
    pub pool: PoolConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Passive endpoint health.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration for the host adapter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests accepted by the host adapter.
    pub max_connections: usize,

    /// Filesystem root used to build the translated path of each request.
    pub document_root: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            document_root: None,
        }
    }
}

/// Application-server endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique endpoint identifier, used in logs and metrics.
    pub name: String,

    /// Endpoint address (e.g., "127.0.0.1:6800").
    pub address: String,

    /// Maximum connections (in use or idle) to this endpoint.
    #[serde(default = "default_max_backend_conns")]
    pub max_connections: usize,
}

fn default_max_backend_conns() -> usize {
    32
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle connections older than this are closed.
    pub idle_timeout_secs: u64,

    /// How long a request may wait for a free connection.
    pub acquire_timeout_ms: u64,

    /// Interval of the background idle reaper.
    pub reap_interval_secs: u64,

    /// Extra connect attempts after the first one fails.
    pub connect_retries: u32,

    /// Base delay for exponential backoff between connect attempts.
    pub retry_base_delay_ms: u64,

    /// Maximum delay for exponential backoff between connect attempts.
    pub retry_max_delay_ms: u64,

    /// Open one connection to the first reachable endpoint at startup; fail if none is reachable.
    pub prewarm: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            acquire_timeout_ms: 5_000,
            reap_interval_secs: 10,
            connect_retries: 2,
            retry_base_delay_ms: 50,
            retry_max_delay_ms: 1_000,
            prewarm: true,
        }
    }
}

/// Timeout configuration for backend operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-attempt connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Deadline for each individual backend read or write in milliseconds.
    pub io_ms: u64,

    /// Overall request deadline enforced by the host adapter in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 2_000,
            io_ms: 30_000,
            request_secs: 120,
        }
    }
}

/// Passive health configuration for endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive connectivity failures before an endpoint is marked dead.
    pub unhealthy_threshold: u32,

    /// How long a dead endpoint is skipped before it is tried again.
    pub fail_recover_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            unhealthy_threshold: 1,
            fail_recover_secs: 15,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn io(&self) -> Duration {
        Duration::from_millis(self.io_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl HealthConfig {
    pub fn fail_recover(&self) -> Duration {
        Duration::from_secs(self.fail_recover_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[backends]]
            name = "app-a"
            address = "127.0.0.1:6800"
            "#,
        )
        .unwrap();

        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].max_connections, 32);
        assert_eq!(config.pool.acquire_timeout(), Duration::from_secs(5));
        assert!(config.pool.prewarm);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn sections_override_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [pool]
            idle_timeout_secs = 5
            prewarm = false

            [timeouts]
            io_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.pool.idle_timeout(), Duration::from_secs(5));
        assert!(!config.pool.prewarm);
        assert_eq!(config.timeouts.io(), Duration::from_millis(250));
        assert_eq!(config.timeouts.connect_ms, 2_000);
    }
}
