//! The one persisted broker session.
//!
//! Stored as snake_case [`BrokerSession`] under a single key; every read is
//! handed out as camelCase [`BrokerSessionView`]. Failures never escape the
//! plain operations: unusable data reads as "no session".

mod legacy;
mod normalize;

use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::api::{
    client::ApiClient,
    types::{to_view_shape, BrokerSession, BrokerSessionView},
};
use crate::config::RuntimeConfig;
use crate::utils::storage::{KeyValueStorage, StorageError};

pub use legacy::LegacyBrokerConfig;
pub use normalize::{normalize_for_storage, normalize_value, CONFIG_ID_RULES, USER_ID_RULES};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session payload has no config_id, configId or id")]
    MissingConfigId,

    #[error("stored broker session is malformed: {0}")]
    MalformedStoredData(#[source] serde_json::Error),

    #[error("failed to serialize broker session: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct SessionStore<S> {
    storage: S,
    session_key: String,
    legacy_key: Option<String>,
    slot: Mutex<()>,
}

impl<S: KeyValueStorage> SessionStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, &RuntimeConfig::default())
    }

    pub fn with_config(storage: S, config: &RuntimeConfig) -> Self {
        Self {
            storage,
            session_key: config.session_storage_key(),
            legacy_key: config
                .legacy_write_through()
                .then(|| config.legacy_storage_key()),
            slot: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Normalize and store `payload`, returning the view of what was stored.
    /// On any error the previously stored session is left untouched.
    pub fn try_persist(&self, payload: &Map<String, Value>) -> Result<BrokerSessionView, SessionError> {
        let session = normalize_for_storage(payload)?;
        let _slot = self.lock_slot();
        self.write_session(&session)?;
        self.mirror_legacy(&session);
        log::debug!("Persisted broker session {}", session.config_id);
        Ok(to_view_shape(&session))
    }

    pub fn persist(&self, payload: &Map<String, Value>) -> Option<BrokerSessionView> {
        match self.try_persist(payload) {
            Ok(view) => Some(view),
            Err(SessionError::MissingConfigId) => {
                log::warn!("Not persisting broker session: payload has no config id");
                None
            }
            Err(err) => {
                log::error!("Failed to persist broker session: {}", err);
                None
            }
        }
    }

    pub fn try_load(&self) -> Result<Option<BrokerSessionView>, SessionError> {
        Ok(self.read_session()?.as_ref().map(to_view_shape))
    }

    pub fn load(&self) -> Option<BrokerSessionView> {
        match self.try_load() {
            Ok(view) => view,
            Err(SessionError::MalformedStoredData(err)) => {
                log::warn!("Ignoring malformed stored broker session: {}", err);
                None
            }
            Err(err) => {
                log::error!("Failed to load broker session: {}", err);
                None
            }
        }
    }

    /// Flag the stored session for reauth, keeping every other field.
    /// No-op when nothing usable is stored.
    pub fn mark_needs_reauth(&self) {
        let _slot = self.lock_slot();
        let mut session = match self.read_session() {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(err) => {
                log::warn!("Cannot mark broker session for reauth: {}", err);
                return;
            }
        };
        session.needs_reauth = true;
        if let Some(token) = session.token_status.as_mut() {
            token.needs_reauth = true;
        }
        match self.write_session(&session) {
            Ok(()) => self.mirror_legacy(&session),
            Err(err) => log::error!("Failed to store reauth flag: {}", err),
        }
    }

    /// Remove the stored session and its legacy entry. Legacy entries for
    /// other configs stay, as does everything when the slot is unreadable.
    pub fn clear(&self) {
        let _slot = self.lock_slot();
        let active = self.read_session().ok().flatten();
        if let Err(err) = self.storage.remove_item(&self.session_key) {
            log::error!("Failed to clear broker session: {}", err);
        }
        if let (Some(key), Some(session)) = (&self.legacy_key, active) {
            if let Err(err) = legacy::remove_entry(&self.storage, key, &session.config_id) {
                log::warn!("Failed to clear legacy broker config {}: {}", session.config_id, err);
            }
        }
    }

    /// Poll the backend for `config_id` and persist what it reports.
    ///
    /// A 401 flags the stored session for reauth. Any other failure leaves
    /// storage alone. Either way the caller gets the current stored view.
    pub async fn sync_from_status(
        &self,
        client: &ApiClient,
        config_id: &str,
    ) -> Option<BrokerSessionView> {
        match client.fetch_broker_status(config_id).await {
            Ok(body) => self
                .persist(&status_payload(body, config_id))
                .or_else(|| self.load()),
            Err(err) if err.is_unauthorized() => {
                log::warn!("Broker status for {} unauthorized: {}", config_id, err);
                self.mark_needs_reauth();
                self.load()
            }
            Err(err) => {
                log::error!("Failed to refresh broker status for {}: {}", config_id, err);
                self.load()
            }
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, ()> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_session(&self) -> Result<Option<BrokerSession>, SessionError> {
        let Some(raw) = self.storage.get_item(&self.session_key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(SessionError::MalformedStoredData)
    }

    fn write_session(&self, session: &BrokerSession) -> Result<(), SessionError> {
        let body = serde_json::to_string(session).map_err(SessionError::Serialize)?;
        self.storage.set_item(&self.session_key, &body)?;
        Ok(())
    }

    fn mirror_legacy(&self, session: &BrokerSession) {
        if let Some(key) = &self.legacy_key {
            if let Err(err) = legacy::write_through(&self.storage, key, session) {
                log::warn!("Legacy broker config write-through failed: {}", err);
            }
        }
    }
}

/// Status bodies arrive either flat or wrapped as `{ success, data: {...} }`.
/// Lift `data` fields that are missing at the top level (keeping `data` for
/// the nested user id rule) and fall back to the polled config id.
fn status_payload(body: Value, config_id: &str) -> Map<String, Value> {
    let mut payload = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Some(Value::Object(data)) = payload.get("data").cloned() {
        for (key, value) in data {
            payload.entry(key).or_insert(value);
        }
    }
    let has_config_id = CONFIG_ID_RULES
        .iter()
        .any(|rule| rule.len() == 1 && payload.get(rule[0]).is_some_and(non_blank));
    if !has_config_id {
        payload.insert("config_id".into(), Value::String(config_id.to_string()));
    }
    payload
}

fn non_blank(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(_) => true,
        _ => false,
    }
}
