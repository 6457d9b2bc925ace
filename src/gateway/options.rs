//! Client identity and connection options.

use std::time::Duration;

use crate::config::AppConfig;

pub const DEFAULT_GATEWAY_URL: &str = "ws://localhost:18789";
pub const DEFAULT_SESSION_KEY: &str = "main";
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const RECONNECT_BACKOFF_FACTOR: f64 = 1.5;
/// Upper bound on a single reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(300);

/// Options for a gateway session.
///
/// Use the builder methods to customise; unset fields keep the web chat
/// client's defaults.
///
/// ```
/// use opengloves::gateway::ClientOptions;
///
/// let options = ClientOptions::new("ws://127.0.0.1:18789")
///     .with_token("secret")
///     .with_session_key("work");
/// assert_eq!(options.session_key, "work");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub url: String,
    pub token: Option<String>,
    pub password: Option<String>,
    pub client_name: String,
    pub client_version: String,
    pub platform: String,
    pub mode: String,
    pub instance_id: String,
    /// Chat thread that typed chat operations target.
    pub session_key: String,
    pub scopes: Vec<String>,
    pub role: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: None,
            password: None,
            client_name: "webchat".to_string(),
            client_version: "1.0.0".to_string(),
            platform: "web".to_string(),
            mode: "webchat".to_string(),
            instance_id: "standalone-chat".to_string(),
            session_key: DEFAULT_SESSION_KEY.to_string(),
            scopes: vec![
                "operator.admin".to_string(),
                "operator.approvals".to_string(),
                "operator.pairing".to_string(),
            ],
            role: "operator".to_string(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
        }
    }
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Options for connecting to the gateway described by `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut options = Self::new(config.gateway.url.clone())
            .with_session_key(config.ui.session_key.clone());
        options.token = config.gateway.token.clone();
        options.password = config.gateway.password.clone();
        options
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = id.into();
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Delay before reconnect attempt `attempt` (1-based):
    /// `base × 1.5^(attempt-1)`, capped at [`MAX_RECONNECT_DELAY`].
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        reconnect_delay(self.reconnect_base_delay, attempt)
    }
}

pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let secs = base.as_secs_f64() * RECONNECT_BACKOFF_FACTOR.powi(exponent);
    Duration::try_from_secs_f64(secs)
        .map(|delay| delay.min(MAX_RECONNECT_DELAY))
        .unwrap_or(MAX_RECONNECT_DELAY)
}
