//! Application configuration.
//!
//! Loaded from a JSON file (default `config.json`, or the path in
//! `OPENGLOVES_CONFIG`), then overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `OPENGLOVES_GATEWAY_URL` | `gateway.url` |
//! | `OPENGLOVES_GATEWAY_TOKEN` | `gateway.token` |
//! | `OPENGLOVES_ACCESS_PASSWORD` | `access.password` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::gateway::options::{DEFAULT_GATEWAY_URL, DEFAULT_SESSION_KEY};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const CONFIG_PATH_ENV: &str = "OPENGLOVES_CONFIG";
pub const GATEWAY_URL_ENV: &str = "OPENGLOVES_GATEWAY_URL";
pub const GATEWAY_TOKEN_ENV: &str = "OPENGLOVES_GATEWAY_TOKEN";
pub const ACCESS_PASSWORD_ENV: &str = "OPENGLOVES_ACCESS_PASSWORD";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub ui: UiConfig,
    pub access: AccessConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path on which the relay accepts WebSocket upgrades.
    pub relay_path: String,
    /// How long the relay waits for the upstream handshake before giving up.
    pub upstream_dial_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            relay_path: "/ws".to_string(),
            upstream_dial_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn upstream_dial_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_dial_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// URL clients use to reach the gateway.
    pub url: String,
    /// URL the relay dials; defaults to `url`.
    pub upstream_url: Option<String>,
    pub token: Option<String>,
    pub password: Option<String>,
    pub auto_detect_url: bool,
    pub fallback_urls: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            upstream_url: None,
            token: None,
            password: None,
            auto_detect_url: false,
            fallback_urls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiConfig {
    pub session_key: String,
    /// Unrecognised UI settings, handed to clients untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            session_key: DEFAULT_SESSION_KEY.to_string(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessConfig {
    /// When set, relay upgrades need a ticket from `/api/auth`.
    pub password: Option<String>,
    pub nonce_ttl_secs: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            password: None,
            nonce_ttl_secs: 300,
        }
    }
}

impl AccessConfig {
    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_secs)
    }

    pub fn is_enabled(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config file path from `OPENGLOVES_CONFIG`, else `config.json`.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let config = Self::parse(&text, path)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound { .. }) => {
                info!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: AppConfig =
            serde_json::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the `OPENGLOVES_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = std::env::var(GATEWAY_URL_ENV) {
            self.gateway.url = url;
        }
        if let Ok(token) = std::env::var(GATEWAY_TOKEN_ENV) {
            self.gateway.token = Some(token);
        }
        if let Ok(password) = std::env::var(ACCESS_PASSWORD_ENV) {
            self.access.password = Some(password);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ws_url("gateway.url", &self.gateway.url)?;
        if let Some(upstream) = self.gateway.upstream_url.as_deref() {
            check_ws_url("gateway.upstreamUrl", upstream)?;
        }
        if !self.server.relay_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "server.relayPath",
                message: format!("'{}' must start with '/'", self.server.relay_path),
            });
        }
        if self.ui.session_key.is_empty() {
            return Err(ConfigError::Invalid {
                field: "ui.sessionKey",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway.url = url.into();
        self
    }

    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.gateway.upstream_url = Some(url.into());
        self
    }

    pub fn with_gateway_token(mut self, token: impl Into<String>) -> Self {
        self.gateway.token = Some(token.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    pub fn with_relay_path(mut self, path: impl Into<String>) -> Self {
        self.server.relay_path = path.into();
        self
    }

    pub fn with_upstream_dial_timeout(mut self, timeout: Duration) -> Self {
        self.server.upstream_dial_timeout_ms =
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.ui.session_key = key.into();
        self
    }

    pub fn with_access_password(mut self, password: impl Into<String>) -> Self {
        self.access.password = Some(password.into());
        self
    }

    pub fn with_nonce_ttl_secs(mut self, secs: u64) -> Self {
        self.access.nonce_ttl_secs = secs;
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Gateway URL the relay dials.
    pub fn upstream_url(&self) -> &str {
        self.gateway
            .upstream_url
            .as_deref()
            .unwrap_or(&self.gateway.url)
    }

    /// The subset of the config served to browsers at `/api/config`.
    pub fn client_view(&self) -> Value {
        json!({
            "gateway": {
                "url": self.gateway.url,
                "token": self.gateway.token,
                "autoDetectUrl": self.gateway.auto_detect_url,
                "fallbackUrls": self.gateway.fallback_urls,
            },
            "ui": self.ui,
        })
    }
}

fn check_ws_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            message: format!("'{}' is not a ws:// or wss:// URL", url),
        })
    }
}
