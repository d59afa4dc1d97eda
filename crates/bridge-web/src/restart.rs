//! Host restart channel
//!
//! Handles restart requests arriving from page script over a named
//! method channel. A valid request is acknowledged first, then the
//! page is reloaded after a short grace period so the acknowledgement
//! can reach the caller before this context goes away.

use bridge_core::ChannelError;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::console;

/// Delay between acknowledging a restart and reloading, so the reply
/// has time to cross back to the caller.
pub const RESTART_GRACE_MS: i32 = 500;

/// Dispatcher for the host-side message channel
#[wasm_bindgen]
pub struct RestartHandler {}

#[wasm_bindgen]
impl RestartHandler {
    #[wasm_bindgen(constructor)]
    pub fn new() -> RestartHandler {
        RestartHandler {}
    }

    /// Handle one channel call. Known method: `requestAppRestart`,
    /// whose arguments must carry a string `reason`.
    ///
    /// Errors come back as `{ code, message }` objects; a successful
    /// restart request resolves `true` before the reload fires.
    pub fn handle(&self, method: &str, args: JsValue) -> Result<JsValue, JsValue> {
        match method {
            "requestAppRestart" => {
                let reason = js_sys::Reflect::get(&args, &"reason".into())
                    .ok()
                    .and_then(|v| v.as_string());
                let reason = match reason {
                    Some(r) => r,
                    None => {
                        return Err(channel_error(&ChannelError::InvalidArguments(
                            "restart requires a string reason",
                        )));
                    }
                };
                console::log_1(&format!("[restart] requested: {reason}").into());
                schedule_reload()?;
                Ok(JsValue::TRUE)
            }
            other => Err(channel_error(&ChannelError::NotImplemented(
                other.to_string(),
            ))),
        }
    }
}

impl Default for RestartHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// `{ code, message }` object for the channel boundary
fn channel_error(error: &ChannelError) -> JsValue {
    let out = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&out, &"code".into(), &error.code().into());
    let _ = js_sys::Reflect::set(&out, &"message".into(), &error.to_string().into());
    out.into()
}

fn schedule_reload() -> Result<(), JsValue> {
    let window = web_sys::window()
        .ok_or_else(|| JsValue::from_str("restart requires a window context"))?;
    let reload = Closure::once_into_js(move || {
        if let Some(window) = web_sys::window() {
            if let Err(e) = window.location().reload() {
                console::error_1(&e);
            }
        }
    });
    window
        .set_timeout_with_callback_and_timeout_and_arguments_0(
            reload.unchecked_ref::<js_sys::Function>(),
            RESTART_GRACE_MS,
        )
        .map(|_| ())
}
