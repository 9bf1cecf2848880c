//! Deprecated array-of-configs mirror of the active session.
//!
//! Older screens read `[{ id, brokerName, userId, isConnected, ... }]` from a
//! second storage key. Everything here is best-effort and can be deleted in
//! one go once nothing reads that key anymore.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SessionError;
use crate::api::types::{BrokerSession, ConnectionStatus, SessionStatus};
use crate::utils::storage::KeyValueStorage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBrokerConfig {
    pub id: String,
    pub broker_name: String,
    pub user_id: Option<String>,
    pub is_connected: bool,
    pub session_status: SessionStatus,
    pub needs_reauth: bool,
    #[serde(default)]
    pub connection_status: Option<ConnectionStatus>,
}

impl From<&BrokerSession> for LegacyBrokerConfig {
    fn from(session: &BrokerSession) -> Self {
        Self {
            id: session.config_id.clone(),
            broker_name: session.broker_name.clone(),
            user_id: session.user_id.clone(),
            is_connected: session.session_status == SessionStatus::Connected
                && !session.needs_reauth,
            session_status: session.session_status,
            needs_reauth: session.needs_reauth,
            connection_status: session.connection_status.clone(),
        }
    }
}

/// Upsert `session` as the first entry, keeping entries for other configs as-is.
pub(crate) fn write_through<S: KeyValueStorage>(
    storage: &S,
    key: &str,
    session: &BrokerSession,
) -> Result<(), SessionError> {
    let mut entries = read_entries(storage, key)?;
    entries.retain(|entry| !is_entry_for(entry, &session.config_id));
    entries.insert(
        0,
        serde_json::to_value(LegacyBrokerConfig::from(session)).map_err(SessionError::Serialize)?,
    );
    let body = serde_json::to_string(&entries).map_err(SessionError::Serialize)?;
    storage.set_item(key, &body)?;
    Ok(())
}

/// Drop the entry for `config_id`. The key goes away with its last entry.
pub(crate) fn remove_entry<S: KeyValueStorage>(
    storage: &S,
    key: &str,
    config_id: &str,
) -> Result<(), SessionError> {
    let mut entries = read_entries(storage, key)?;
    entries.retain(|entry| !is_entry_for(entry, config_id));
    if entries.is_empty() {
        storage.remove_item(key)?;
        return Ok(());
    }
    let body = serde_json::to_string(&entries).map_err(SessionError::Serialize)?;
    storage.set_item(key, &body)?;
    Ok(())
}

fn is_entry_for(entry: &Value, config_id: &str) -> bool {
    entry.get("id").and_then(Value::as_str) == Some(config_id)
}

fn read_entries<S: KeyValueStorage>(storage: &S, key: &str) -> Result<Vec<Value>, SessionError> {
    let Some(raw) = storage.get_item(key)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<Value>>(&raw) {
        Ok(entries) => Ok(entries),
        Err(err) => {
            log::warn!("Replacing unreadable legacy broker configs under {}: {}", key, err);
            Ok(Vec::new())
        }
    }
}
