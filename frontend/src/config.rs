use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_SESSION_STORAGE_KEY: &str = "broker_session";
pub const DEFAULT_LEGACY_STORAGE_KEY: &str = "brokerConfigs";

/// Runtime settings, every field optional so a partial `config.json` works.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub api_base_url: Option<String>,
    pub session_storage_key: Option<String>,
    pub legacy_storage_key: Option<String>,
    pub legacy_write_through: Option<bool>,
}

impl RuntimeConfig {
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("Failed to parse runtime config")
    }

    pub fn api_base_url(&self) -> String {
        non_empty(self.api_base_url.as_deref())
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn session_storage_key(&self) -> String {
        non_empty(self.session_storage_key.as_deref())
            .unwrap_or(DEFAULT_SESSION_STORAGE_KEY)
            .to_string()
    }

    pub fn legacy_storage_key(&self) -> String {
        non_empty(self.legacy_storage_key.as_deref())
            .unwrap_or(DEFAULT_LEGACY_STORAGE_KEY)
            .to_string()
    }

    pub fn legacy_write_through(&self) -> bool {
        self.legacy_write_through.unwrap_or(true)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let legacy_write_through = lookup("QUANTUMLEAP_LEGACY_WRITE_THROUGH").and_then(|raw| {
            let parsed = parse_flag(&raw);
            if parsed.is_none() {
                log::warn!("Ignoring invalid QUANTUMLEAP_LEGACY_WRITE_THROUGH value: {}", raw);
            }
            parsed
        });
        Self {
            api_base_url: lookup("QUANTUMLEAP_API_BASE_URL"),
            session_storage_key: lookup("QUANTUMLEAP_SESSION_KEY"),
            legacy_storage_key: lookup("QUANTUMLEAP_LEGACY_KEY"),
            legacy_write_through,
        }
    }

    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read runtime config {}", path.display()))?;
        Self::from_json_str(&raw)
    }
}

#[cfg(target_arch = "wasm32")]
impl RuntimeConfig {
    /// Reads `window.__QUANTUMLEAP_ENV = { API_BASE_URL: "...", ... }`.
    /// Upper- and lower-case key spellings are both accepted.
    pub fn from_window_globals() -> Self {
        let Some(env) = window_env() else {
            return Self::default();
        };
        Self {
            api_base_url: env_string(&env, "API_BASE_URL"),
            session_storage_key: env_string(&env, "SESSION_STORAGE_KEY"),
            legacy_storage_key: env_string(&env, "LEGACY_STORAGE_KEY"),
            legacy_write_through: env_string(&env, "LEGACY_WRITE_THROUGH")
                .and_then(|raw| parse_flag(&raw)),
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn window_env() -> Option<js_sys::Object> {
    let w = web_sys::window()?;
    let any = js_sys::Reflect::get(&w, &"__QUANTUMLEAP_ENV".into()).ok()?;
    if any.is_undefined() || any.is_null() {
        return None;
    }
    Some(js_sys::Object::from(any))
}

#[cfg(target_arch = "wasm32")]
fn env_string(obj: &js_sys::Object, upper: &str) -> Option<String> {
    let lower = upper.to_ascii_lowercase();
    let val = js_sys::Reflect::get(obj, &upper.into())
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
        .or_else(|| js_sys::Reflect::get(obj, &lower.as_str().into()).ok())?;
    val.as_string().or_else(|| val.as_bool().map(|b| b.to_string()))
}


#[cfg(all(test, not(target_arch = "wasm32")))]
mod host_tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn from_lookup_reads_prefixed_variables() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("QUANTUMLEAP_API_BASE_URL", "https://railway.test/api"),
            ("QUANTUMLEAP_SESSION_KEY", "session_v2"),
            ("QUANTUMLEAP_LEGACY_WRITE_THROUGH", "no"),
        ]);
        let cfg = RuntimeConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(cfg.api_base_url(), "https://railway.test/api");
        assert_eq!(cfg.session_storage_key(), "session_v2");
        assert_eq!(cfg.legacy_storage_key(), DEFAULT_LEGACY_STORAGE_KEY);
        assert!(!cfg.legacy_write_through());
    }

    #[test]
    fn invalid_flag_is_ignored() {
        let cfg = RuntimeConfig::from_lookup(|name| {
            (name == "QUANTUMLEAP_LEGACY_WRITE_THROUGH").then(|| "sometimes".to_string())
        });
        assert!(cfg.legacy_write_through.is_none());
    }

    #[test]
    fn reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"legacy_storage_key":"configs_v1"}"#).unwrap();
        let cfg = RuntimeConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.legacy_storage_key(), "configs_v1");

        let missing = RuntimeConfig::from_json_file(dir.path().join("nope.json"));
        assert!(missing.is_err());
    }
}
