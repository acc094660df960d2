//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML manifests and
//! default every field so minimal files stay minimal.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::http::request::DEFAULT_MAX_BODY_BYTES;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServeConfig {
    /// Listeners started by the launcher, in order.
    pub listeners: Vec<ListenerConfig>,

    /// Dispatch pipeline settings.
    pub dispatch: DispatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Static responses served by the launcher.
    pub routes: Vec<StaticRouteConfig>,
}

/// Bind configuration for one listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind port; 0 picks a free port.
    pub port: u16,

    /// Bind address or host name.
    pub host: String,

    /// Certificate material; selects HTTPS when present.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "localhost".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

impl ListenerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }
}

/// Certificate and private key for an encrypted listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    pub certificate: PemSource,
    pub private_key: PemSource,
}

/// PEM material, inline or on disk.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PemSource {
    /// PEM text.
    Pem(String),
    /// Path to a PEM file.
    File(PathBuf),
}

/// Dispatch pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long to wait for a `fetch` subscriber to respond; unset waits
    /// indefinitely.
    pub fallback_timeout_ms: Option<u64>,

    /// Cap for the request body collectors (`bytes`, `text`, `json`).
    pub max_body_bytes: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fallback_timeout_ms: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus scrape endpoint.
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

/// A canned response keyed by method and path pattern.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticRouteConfig {
    /// HTTP method (e.g. "GET").
    #[serde(default = "default_method")]
    pub method: String,

    /// Path pattern (`/literal/:param`).
    pub path: String,

    /// Response status code.
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response body; `{name}` is replaced by the `:name` capture.
    #[serde(default)]
    pub body: String,

    /// Response content type.
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "text/plain; charset=utf-8".to_string()
}
