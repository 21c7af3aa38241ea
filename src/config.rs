use crate::error::{GatewayError, Result};
use crate::providers::ModelProviderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Process-wide gateway settings. Immutable once the server starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Seconds to wait for upstream response headers.
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Cap on the diagnostic copy of an upstream error body. The relayed body
    /// is never truncated.
    #[serde(default = "default_max_error_body_bytes")]
    pub max_error_body_bytes: usize,
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    /// Response headers relayed in addition to the built-in allow-list.
    #[serde(default)]
    pub extra_response_headers: Vec<String>,
    #[serde(default)]
    pub cors: bool,
    #[serde(default)]
    pub debug: DebugConfig,
    /// Model to provider entries layered over the built-in table.
    #[serde(default)]
    pub models: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Log full JSON request bodies instead of a summary.
    #[serde(default)]
    pub body: bool,
    /// Log inbound header names.
    #[serde(default)]
    pub headers: bool,
    /// Log a preview of non-streaming `200` response bodies.
    #[serde(default)]
    pub response: bool,
}

fn default_port() -> u16 {
    3001
}

fn default_upstream_base_url() -> String {
    "https://rvlautoai.ru/webhook".to_string()
}

fn default_provider() -> String {
    "Capi".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_error_body_bytes() -> usize {
    64 * 1024
}

fn default_max_request_body_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            upstream_base_url: default_upstream_base_url(),
            default_provider: default_provider(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_error_body_bytes: default_max_error_body_bytes(),
            max_request_body_bytes: default_max_request_body_bytes(),
            extra_response_headers: Vec::new(),
            cors: false,
            debug: DebugConfig::default(),
            models: HashMap::new(),
        }
    }
}

impl GatewayConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Build the effective config from the process environment.
    ///
    /// Priority: explicit path > `GATEWAY_CONFIG` > defaults, then the
    /// environment overlay on top.
    pub fn resolve(explicit_path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_PATH_ENV).ok();
        let path = explicit_path.or(from_env.as_deref().map(Path::new));

        let mut config = match path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading config");
                Self::load(path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay environment variables using `lookup` to read them.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("API_BASE_URL") {
            self.upstream_base_url = url;
        }
        if let Some(provider) = lookup("DEFAULT_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(port) = lookup("PROXY_PORT") {
            self.port = parse_env("PROXY_PORT", &port)?;
        }
        if let Some(secs) = lookup("UPSTREAM_TIMEOUT_SECS") {
            self.upstream_timeout_secs = parse_env("UPSTREAM_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("UPSTREAM_CONNECT_TIMEOUT_SECS") {
            self.connect_timeout_secs = parse_env("UPSTREAM_CONNECT_TIMEOUT_SECS", &secs)?;
        }
        if let Some(bytes) = lookup("MAX_ERROR_BODY_BYTES") {
            self.max_error_body_bytes = parse_env("MAX_ERROR_BODY_BYTES", &bytes)?;
        }

        let flag = |key: &str| lookup(key).map(|v| v == "true");
        if let Some(on) = flag("GATEWAY_CORS") {
            self.cors = on;
        }
        if let Some(on) = flag("DEBUG_BODY") {
            self.debug.body = on;
        }
        if let Some(on) = flag("DEBUG_HEADERS") {
            self.debug.headers = on;
        }
        if let Some(on) = flag("DEBUG_RESPONSE") {
            self.debug.response = on;
        }
        Ok(())
    }

    /// Parse and check the upstream origin.
    pub fn upstream_url(&self) -> Result<reqwest::Url> {
        let url = reqwest::Url::parse(&self.upstream_base_url).map_err(|e| {
            GatewayError::config(format!(
                "Invalid upstream base URL '{}': {}",
                self.upstream_base_url, e
            ))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(GatewayError::config(format!(
                "Upstream base URL must be http or https, got '{other}'"
            ))),
        }
    }

    /// Base URL without a trailing slash, ready for a path to be appended.
    #[must_use]
    pub fn upstream_base(&self) -> &str {
        self.upstream_base_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn model_map(&self) -> ModelProviderMap {
        ModelProviderMap::with_overrides(&self.models)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        GatewayError::config(format!("Invalid value '{value}' for {key}: {e}"))
    })
}
