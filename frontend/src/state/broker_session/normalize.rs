//! Inbound payload normalization.
//!
//! Each logical field has an ordered table of key paths. The first path that
//! yields a usable value wins, so the lookup order is readable straight from
//! the tables below.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::SessionError;
use crate::api::types::{
    BrokerSession, ConnectionStatus, SessionStatus, TokenStatus, DEFAULT_BROKER_NAME,
};

type KeyPath = &'static [&'static str];

pub const CONFIG_ID_RULES: &[KeyPath] = &[&["config_id"], &["configId"], &["id"]];

pub const USER_ID_RULES: &[KeyPath] = &[
    &["user_id"],
    &["userId"],
    &["user_data", "user_id"],
    &["data", "user_id"],
    &["broker_user_id"],
];

const BROKER_NAME_RULES: &[KeyPath] = &[&["broker_name"], &["brokerName"]];
const SESSION_STATUS_RULES: &[KeyPath] = &[&["session_status"], &["sessionStatus"]];
const NEEDS_REAUTH_RULES: &[KeyPath] = &[&["needs_reauth"], &["needsReauth"]];
const CONNECTION_STATUS_RULES: &[KeyPath] = &[&["connection_status"], &["connectionStatus"]];
const TOKEN_STATUS_RULES: &[KeyPath] = &[&["token_status"], &["tokenStatus"]];

/// Reshape an arbitrarily keyed payload into the stored snake_case session.
///
/// Only a missing config id fails. A missing user id is logged and stored as
/// `None`, since upstream responses drop it depending on timing.
pub fn normalize_for_storage(payload: &Map<String, Value>) -> Result<BrokerSession, SessionError> {
    let config_id = first_string(payload, CONFIG_ID_RULES).ok_or(SessionError::MissingConfigId)?;

    let user_id = first_string(payload, USER_ID_RULES);
    if user_id.is_none() {
        log::warn!(
            "Broker session {} has no user_id in any known location; storing without it",
            config_id
        );
    }

    let broker_name =
        first_string(payload, BROKER_NAME_RULES).unwrap_or_else(|| DEFAULT_BROKER_NAME.to_string());

    let session_status = match first_string(payload, SESSION_STATUS_RULES) {
        Some(raw) => SessionStatus::parse(&raw).unwrap_or_else(|| {
            log::warn!("Unknown session_status {:?}; treating as disconnected", raw);
            SessionStatus::Disconnected
        }),
        None => SessionStatus::Disconnected,
    };

    Ok(BrokerSession {
        config_id,
        user_id,
        broker_name,
        session_status,
        needs_reauth: first_bool(payload, NEEDS_REAUTH_RULES).unwrap_or(true),
        connection_status: first_object::<ConnectionStatus>(payload, CONNECTION_STATUS_RULES),
        token_status: first_object::<TokenStatus>(payload, TOKEN_STATUS_RULES),
    })
}

/// Same as [`normalize_for_storage`] for an untyped value; non-objects carry no config id.
pub fn normalize_value(payload: &Value) -> Result<BrokerSession, SessionError> {
    match payload {
        Value::Object(map) => normalize_for_storage(map),
        _ => Err(SessionError::MissingConfigId),
    }
}

fn lookup<'a>(payload: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = payload.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn first_string(payload: &Map<String, Value>, rules: &[KeyPath]) -> Option<String> {
    rules
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find_map(scalar_string)
}

fn first_bool(payload: &Map<String, Value>, rules: &[KeyPath]) -> Option<bool> {
    rules
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find_map(scalar_bool)
}

/// Nested status objects are copied through; a non-object at a path is skipped.
fn first_object<T: DeserializeOwned>(payload: &Map<String, Value>, rules: &[KeyPath]) -> Option<T> {
    rules
        .iter()
        .filter_map(|path| lookup(payload, path).map(|value| (path, value)))
        .find_map(|(path, value)| {
            if !value.is_object() {
                log::warn!("Ignoring non-object {}", path.join("."));
                return None;
            }
            match serde_json::from_value(value.clone()) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    log::warn!("Ignoring malformed {}: {}", path.join("."), err);
                    None
                }
            }
        })
}
