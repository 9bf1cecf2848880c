//! OAuth callback redirect parsing.
//!
//! The backend redirects back with something like
//! `/broker/callback?status=success&config_id=abc-123&user_id=EBW183`.
//! The query becomes an inbound session payload for the session store.

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

/// Accepts a bare query, a `?query`, or a full URL. Fragments are ignored.
/// When a key repeats, the first occurrence wins.
pub fn parse_callback_query(input: &str) -> Map<String, Value> {
    let without_fragment = input.split('#').next().unwrap_or_default();
    let query = match without_fragment.split_once('?') {
        Some((_, query)) => query,
        None => without_fragment,
    };

    let mut payload = Map::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(raw_key);
        if key.is_empty() || payload.contains_key(&key) {
            continue;
        }
        payload.insert(key, Value::String(decode_component(raw_value)));
    }

    apply_outcome(&mut payload);
    payload
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// `status` is the OAuth outcome, not the session status, so translate it
/// unless the redirect already carries explicit session fields.
fn apply_outcome(payload: &mut Map<String, Value>) {
    let Some(outcome) = payload.get("status").and_then(Value::as_str) else {
        return;
    };
    let (session_status, needs_reauth) = match outcome.trim().to_ascii_lowercase().as_str() {
        "success" | "connected" => ("connected", false),
        "error" | "failed" | "failure" => ("error", true),
        _ => return,
    };
    payload
        .entry("session_status")
        .or_insert_with(|| Value::String(session_status.to_string()));
    payload
        .entry("needs_reauth")
        .or_insert(Value::Bool(needs_reauth));
}
