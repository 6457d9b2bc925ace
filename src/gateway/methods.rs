//! Request builders for the gateway methods the client uses.

use serde::Serialize;
use serde_json::{Map, Value};

use super::frame::{generate_idempotency_key, RequestFrame};
use super::options::ClientOptions;

pub const METHOD_CONNECT: &str = "connect";
pub const METHOD_CHAT_SEND: &str = "chat.send";
pub const METHOD_CHAT_HISTORY: &str = "chat.history";
pub const METHOD_CHAT_ABORT: &str = "chat.abort";
pub const METHOD_SESSIONS_LIST: &str = "sessions.list";

pub const EVENT_CONNECT_CHALLENGE: &str = "connect.challenge";
pub const EVENT_CHAT: &str = "chat";
/// Name under which `hello-ok` frames are emitted.
pub const EVENT_HELLO: &str = "hello";

pub const MIN_PROTOCOL: u32 = 1;
pub const MAX_PROTOCOL: u32 = 3;
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const DEFAULT_SESSIONS_LIMIT: u32 = 50;

/// Parameters of the `connect` handshake request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub scopes: Vec<String>,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthCredential>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
    pub instance_id: String,
}

/// Credential sent with `connect`. Exactly one kind is ever sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AuthCredential {
    Token { token: String },
    Password { password: String },
}

impl AuthCredential {
    /// Token wins over password; empty strings count as unset.
    pub fn select(token: Option<&str>, password: Option<&str>) -> Option<Self> {
        match (non_empty(token), non_empty(password)) {
            (Some(token), _) => Some(AuthCredential::Token {
                token: token.to_string(),
            }),
            (None, Some(password)) => Some(AuthCredential::Password {
                password: password.to_string(),
            }),
            (None, None) => None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl ConnectParams {
    pub fn from_options(options: &ClientOptions) -> Self {
        Self {
            min_protocol: MIN_PROTOCOL,
            max_protocol: MAX_PROTOCOL,
            client: ClientInfo {
                id: options.client_name.clone(),
                version: options.client_version.clone(),
                platform: options.platform.clone(),
                mode: options.mode.clone(),
                instance_id: options.instance_id.clone(),
            },
            scopes: options.scopes.clone(),
            role: options.role.clone(),
            auth: AuthCredential::select(options.token.as_deref(), options.password.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams {
    pub session_key: String,
    pub message: String,
    pub deliver: bool,
    /// Stable across retries of one logical send, unlike the request id.
    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryParams {
    pub session_key: String,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAbortParams {
    pub session_key: String,
}

/// Options for `sessions.list`. Extra options override the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionsListParams {
    pub limit: u32,
    pub include_derived_titles: bool,
    pub include_last_message: bool,
    pub extra: Map<String, Value>,
}

impl Default for SessionsListParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SESSIONS_LIMIT,
            include_derived_titles: true,
            include_last_message: false,
            extra: Map::new(),
        }
    }
}

impl SessionsListParams {
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn into_value(self) -> Value {
        let mut params = Map::new();
        params.insert("limit".to_string(), Value::from(self.limit));
        params.insert(
            "includeDerivedTitles".to_string(),
            Value::Bool(self.include_derived_titles),
        );
        params.insert(
            "includeLastMessage".to_string(),
            Value::Bool(self.include_last_message),
        );
        params.extend(self.extra);
        Value::Object(params)
    }
}

fn to_params<T: Serialize>(params: &T) -> Value {
    // Plain structs of strings, numbers and JSON values always serialise.
    serde_json::to_value(params).unwrap_or(Value::Null)
}

pub fn connect_request(options: &ClientOptions) -> RequestFrame {
    RequestFrame::new(METHOD_CONNECT, to_params(&ConnectParams::from_options(options)))
}

pub fn chat_send_request(session_key: &str, message: &str, attachments: Vec<Value>) -> RequestFrame {
    let params = ChatSendParams {
        session_key: session_key.to_string(),
        message: message.to_string(),
        deliver: false,
        idempotency_key: generate_idempotency_key(),
        attachments,
    };
    RequestFrame::new(METHOD_CHAT_SEND, to_params(&params))
}

pub fn chat_history_request(session_key: &str, limit: u32) -> RequestFrame {
    let params = ChatHistoryParams {
        session_key: session_key.to_string(),
        limit,
    };
    RequestFrame::new(METHOD_CHAT_HISTORY, to_params(&params))
}

pub fn chat_abort_request(session_key: &str) -> RequestFrame {
    let params = ChatAbortParams {
        session_key: session_key.to_string(),
    };
    RequestFrame::new(METHOD_CHAT_ABORT, to_params(&params))
}

pub fn sessions_list_request(params: SessionsListParams) -> RequestFrame {
    RequestFrame::new(METHOD_SESSIONS_LIST, params.into_value())
}
