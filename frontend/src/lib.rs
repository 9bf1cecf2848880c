pub mod api;
pub mod config;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ApiError, BrokerSession, BrokerSessionView, SessionStatus};
pub use config::RuntimeConfig;
pub use state::broker_session::{SessionError, SessionStore};
pub use utils::callback::parse_callback_query;
pub use utils::storage::{KeyValueStorage, MemoryStorage, StorageError};

#[cfg(not(target_arch = "wasm32"))]
pub use utils::storage::FileStorage;

#[cfg(target_arch = "wasm32")]
pub use utils::storage::LocalStorage;

/// Browser store wired to `window.localStorage` and `window.__QUANTUMLEAP_ENV`.
#[cfg(target_arch = "wasm32")]
pub fn browser_session_store() -> SessionStore<LocalStorage> {
    SessionStore::with_config(LocalStorage, &RuntimeConfig::from_window_globals())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
    web_sys::console::log_1(&"QuantumLeap broker session layer ready".into());
}
