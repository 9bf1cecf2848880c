use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_BROKER_NAME: &str = "zerodha";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl SessionStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "connected" => Some(Self::Connected),
            "disconnected" => Some(Self::Disconnected),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Display snapshot of the broker connection. Field names are camelCase in
/// both the stored and the view shape.
///
/// The upstream object is copied through as sent: timestamps keep their JSON
/// type (ISO string or epoch millis) and unrecognized keys land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Validity metadata for the broker access token. Never carries the token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Value>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub needs_reauth: bool,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenStatus {
    /// `expiresAt` as an RFC 3339 string or epoch milliseconds.
    pub fn expires_at_time(&self) -> Option<DateTime<Utc>> {
        match self.expires_at.as_ref()? {
            Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .ok()
                .map(|expires| expires.with_timezone(&Utc)),
            Value::Number(millis) => {
                let millis = millis
                    .as_i64()
                    .or_else(|| millis.as_f64().map(|m| m as i64))?;
                Utc.timestamp_millis_opt(millis).single()
            }
            _ => None,
        }
    }

    /// `false` when `expiresAt` is absent or unreadable.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_time()
            .map(|expires| expires <= now)
            .unwrap_or(false)
    }
}

/// At-rest shape, snake_case like the upstream broker API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSession {
    #[serde(deserialize_with = "non_blank_id")]
    pub config_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_broker_name")]
    pub broker_name: String,
    #[serde(default)]
    pub session_status: SessionStatus,
    #[serde(default = "default_needs_reauth")]
    pub needs_reauth: bool,
    #[serde(default)]
    pub connection_status: Option<ConnectionStatus>,
    #[serde(default)]
    pub token_status: Option<TokenStatus>,
}

/// In-use shape handed to the rest of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerSessionView {
    pub config_id: String,
    pub user_id: Option<String>,
    pub broker_name: String,
    pub session_status: SessionStatus,
    pub needs_reauth: bool,
    pub connection_status: Option<ConnectionStatus>,
    pub token_status: Option<TokenStatus>,
}

fn default_broker_name() -> String {
    DEFAULT_BROKER_NAME.to_string()
}

fn default_needs_reauth() -> bool {
    true
}

fn non_blank_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if raw.trim().is_empty() {
        return Err(de::Error::custom("config_id must not be blank"));
    }
    Ok(raw)
}

/// Strings pass through, numbers and booleans are stringified, anything else is absent.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    })
}

/// Booleans, `"true"`/`"false"` in any case, or a non-zero number.
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::String(text) => text.trim().eq_ignore_ascii_case("true"),
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

impl BrokerSessionView {
    /// Connected, not flagged for reauth, and the token (if described) has not expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.session_status == SessionStatus::Connected
            && !self.needs_reauth
            && !self
                .token_status
                .as_ref()
                .is_some_and(|token| token.is_expired(now))
    }
}

pub fn to_view_shape(session: &BrokerSession) -> BrokerSessionView {
    BrokerSessionView {
        config_id: session.config_id.clone(),
        user_id: session.user_id.clone(),
        broker_name: session.broker_name.clone(),
        session_status: session.session_status,
        needs_reauth: session.needs_reauth,
        connection_status: session.connection_status.clone(),
        token_status: session.token_status.clone(),
    }
}

pub fn to_storage_shape(view: &BrokerSessionView) -> BrokerSession {
    BrokerSession {
        config_id: view.config_id.clone(),
        user_id: view.user_id.clone(),
        broker_name: view.broker_name.clone(),
        session_status: view.session_status,
        needs_reauth: view.needs_reauth,
        connection_status: view.connection_status.clone(),
        token_status: view.token_status.clone(),
    }
}

impl From<BrokerSession> for BrokerSessionView {
    fn from(session: BrokerSession) -> Self {
        to_view_shape(&session)
    }
}

impl From<BrokerSessionView> for BrokerSession {
    fn from(view: BrokerSessionView) -> Self {
        to_storage_shape(&view)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            code: "VALIDATION_ERROR".to_string(),
            details: None,
        }
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            code: "UNKNOWN".to_string(),
            details: None,
        }
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            code: "REQUEST_FAILED".to_string(),
            details: None,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            code: "UNAUTHORIZED".to_string(),
            details: None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == "UNAUTHORIZED"
    }
}
