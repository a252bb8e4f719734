//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatch core.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment (local, test, pre, prod).
    /// Anything other than `local` switches logging to JSON lines.
    pub env: String,

    /// HTTP listener settings.
    pub http: HttpConfig,

    /// Global admission (token bucket) settings.
    pub rate: RateConfig,

    /// Static file fallback settings.
    pub static_dir: StaticConfig,

    /// Shutdown, restart and file watching.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "local".to_string(),
            http: HttpConfig::default(),
            rate: RateConfig::default(),
            static_dir: StaticConfig::default(),
            lifecycle: LifecycleConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen port. `0` asks the OS for a free port.
    pub port: u16,

    /// Serve HTTPS instead of plain HTTP.
    pub https: bool,

    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl HttpConfig {
    /// True when the TLS related settings differ. Such a change needs a restart.
    pub fn tls_changed(&self, other: &HttpConfig) -> bool {
        self.https != other.https
            || self.cert_path != other.cert_path
            || self.key_path != other.key_path
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            https: false,
            cert_path: String::new(),
            key_path: String::new(),
            request_timeout_secs: 30,
            max_body_bytes: 32 << 20,
        }
    }
}

/// Admission (rate limiting) configuration.
///
/// `per_second <= 0` or `bucket == 0` disables admission entirely.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateConfig {
    /// Tokens added to the bucket per second.
    pub per_second: f64,

    /// Bucket capacity (burst).
    pub bucket: u32,

    /// How long a request may wait for a token, in milliseconds. `0` never waits.
    pub wait_millisecond: u64,

    /// Also apply one bucket per client IP, with the same parameters.
    pub per_client: bool,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            per_second: 0.0,
            bucket: 0,
            wait_millisecond: 0,
            per_client: false,
        }
    }
}

/// Static file fallback configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticConfig {
    /// URL prefix stripped before the file lookup (e.g. "assets/").
    pub prefix: String,

    /// Local directory holding the files.
    pub local_path: String,

    /// File served when the resolved path is a directory.
    pub index: String,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            local_path: "front_end/".to_string(),
            index: "index.html".to_string(),
        }
    }
}

/// Process lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Grace window for in-flight requests on shutdown, in seconds.
    pub shutdown_grace_secs: u64,

    /// File watcher poll interval in seconds.
    pub watch_interval_secs: u64,

    /// Restart automatically when the running executable changes.
    pub watch_self: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 30,
            watch_interval_secs: 3,
            watch_self: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [rate]
            per_second = 5.0
            bucket = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.env, "local");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.rate.bucket, 10);
        assert_eq!(config.rate.wait_millisecond, 0);
        assert_eq!(config.static_dir.index, "index.html");
        assert_eq!(config.lifecycle.shutdown_grace_secs, 30);
    }

    #[test]
    fn tls_change_detection() {
        let a = HttpConfig::default();
        let mut b = a.clone();
        b.port = 9000;
        assert!(!a.tls_changed(&b));

        b.https = true;
        assert!(a.tls_changed(&b));
    }
}
