//! JsValue ↔ serde_json::Value conversion
//!
//! Messages cross the worker boundary as plain JS objects; on the Rust
//! side they are JSON values. The round trip goes through
//! `JSON.stringify` / `JSON.parse`, which also guarantees the payloads
//! stay structured-clone friendly.

use wasm_bindgen::JsValue;

pub fn js_to_value(value: &JsValue) -> Result<serde_json::Value, String> {
    if value.is_undefined() || value.is_null() {
        return Ok(serde_json::Value::Null);
    }
    let text: String = js_sys::JSON::stringify(value)
        .map_err(|e| js_error_string(&e))?
        .into();
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

pub fn value_to_js(value: &serde_json::Value) -> Result<JsValue, String> {
    if value.is_null() {
        return Ok(JsValue::NULL);
    }
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    js_sys::JSON::parse(&text).map_err(|e| js_error_string(&e))
}

/// Best-effort human-readable rendering of a JS exception
pub fn js_error_string(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(value, &"message".into())
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", value))
}
