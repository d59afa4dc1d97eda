//! Main-context proxy over a dedicated worker
//!
//! Owns the `Worker`, tags every outgoing call with a correlation id,
//! and settles the matching JS promise when the response comes back.
//! Out-of-order responses are fine; responses for ids nobody is
//! waiting on are logged and dropped.

use std::rc::Rc;

use bridge_core::{CallProxy, CallTransport, Inbound, WireMessage};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{console, MessageEvent, Worker};

use crate::convert::{js_error_string, js_to_value, value_to_js};

/// Post side of the worker channel. Serializes a wire message to a
/// plain JS object and hands it to `postMessage`.
pub struct WorkerTransport {
    worker: Worker,
}

impl CallTransport for WorkerTransport {
    fn post(&self, message: &WireMessage) -> Result<(), String> {
        let value = serde_json::to_value(message).map_err(|e| e.to_string())?;
        let js = value_to_js(&value)?;
        self.worker
            .post_message(&js)
            .map_err(|e| js_error_string(&e))
    }
}

/// JS-facing handle to the engine running in a worker.
///
/// Each capability call returns a promise that resolves with the
/// engine's result or rejects with its error string. Log pushes bypass
/// the promise machinery entirely and go to the registered handler.
#[wasm_bindgen]
pub struct EngineProxy {
    inner: Rc<CallProxy<WorkerTransport>>,
    worker: Worker,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
}

#[wasm_bindgen]
impl EngineProxy {
    /// Spawn the worker at `worker_url` and wire up response routing.
    #[wasm_bindgen(constructor)]
    pub fn new(worker_url: &str) -> Result<EngineProxy, JsValue> {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        let worker = Worker::new(worker_url)?;
        let inner = Rc::new(CallProxy::new(WorkerTransport {
            worker: worker.clone(),
        }));

        let proxy = inner.clone();
        let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let value = match js_to_value(&event.data()) {
                Ok(v) => v,
                Err(e) => {
                    console::warn_1(&format!("[proxy] unreadable worker message: {e}").into());
                    return;
                }
            };
            let message: WireMessage = match serde_json::from_value(value) {
                Ok(m) => m,
                Err(e) => {
                    console::warn_1(&format!("[proxy] malformed worker message: {e}").into());
                    return;
                }
            };
            match proxy.handle_message(message) {
                Inbound::Completed(_) | Inbound::LogDelivered => {}
                Inbound::Stale(id) => {
                    console::warn_1(
                        &format!("[proxy] response for unknown or settled call {id}").into(),
                    );
                }
                Inbound::LogDiscarded => {
                    console::log_1(&"[proxy] log push with no handler registered".into());
                }
                Inbound::Unexpected => {
                    console::warn_1(&"[proxy] unexpected message from worker".into());
                }
            }
        });
        worker.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        Ok(EngineProxy {
            inner,
            worker,
            _onmessage: onmessage,
        })
    }

    /// Start the engine with `conf` and the given log level.
    #[wasm_bindgen(js_name = mainStart)]
    pub fn main_start(&self, conf: JsValue, log_level: &str) -> js_sys::Promise {
        let params = match js_to_value(&conf) {
            Ok(conf) => serde_json::json!({ "conf": conf, "log_level": log_level }),
            Err(e) => return js_sys::Promise::reject(&JsValue::from_str(&e)),
        };
        self.call("mainStart", params)
    }

    /// Current engine status; answerable even before the engine module
    /// has been loaded.
    #[wasm_bindgen(js_name = mainStatus)]
    pub fn main_status(&self) -> js_sys::Promise {
        self.call("mainStatus", serde_json::Value::Null)
    }

    /// Stop the engine.
    #[wasm_bindgen(js_name = mainStop)]
    pub fn main_stop(&self) -> js_sys::Promise {
        self.call("mainStop", serde_json::Value::Null)
    }

    /// Forward an RPC request object to the engine verbatim.
    pub fn rpc(&self, request: JsValue) -> js_sys::Promise {
        match js_to_value(&request) {
            Ok(params) => self.call("rpc", params),
            Err(e) => js_sys::Promise::reject(&JsValue::from_str(&e)),
        }
    }

    /// Register `handler(level, message)` for engine log pushes. A new
    /// registration replaces the previous one.
    #[wasm_bindgen(js_name = setLogHandler)]
    pub fn set_log_handler(&self, handler: js_sys::Function) {
        self.inner.set_log_handler(Box::new(move |level, message| {
            if let Err(e) = handler.call2(
                &JsValue::NULL,
                &JsValue::from_str(level),
                &JsValue::from_str(message),
            ) {
                console::warn_1(&format!("[proxy] log handler threw: {}", js_error_string(&e)).into());
            }
        }));
    }

    /// Drop the registered log handler; subsequent pushes are
    /// discarded.
    #[wasm_bindgen(js_name = clearLogHandler)]
    pub fn clear_log_handler(&self) {
        self.inner.clear_log_handler();
    }

    /// Abandon an in-flight call. Returns whether anything was still
    /// pending under that id.
    pub fn cancel(&self, id: u64) -> bool {
        self.inner.cancel(id)
    }

    /// Kill the worker. Calls still in flight will never settle, so
    /// reject them locally first.
    pub fn terminate(&self) {
        let pending = self.inner.drain_pending();
        for (id, continuation) in pending {
            console::log_1(&format!("[proxy] rejecting call {id}: worker terminated").into());
            continuation(Err("worker terminated".to_string()));
        }
        self.worker.terminate();
    }
}

impl EngineProxy {
    fn call(&self, method: &str, params: serde_json::Value) -> js_sys::Promise {
        let proxy = self.inner.clone();
        let method = method.to_string();
        js_sys::Promise::new(&mut |resolve, reject| {
            proxy.invoke(
                &method,
                params.clone(),
                Box::new(move |outcome| {
                    let settled = match outcome {
                        Ok(value) => match value_to_js(&value) {
                            Ok(js) => resolve.call1(&JsValue::NULL, &js),
                            Err(e) => reject.call1(&JsValue::NULL, &JsValue::from_str(&e)),
                        },
                        Err(e) => reject.call1(&JsValue::NULL, &JsValue::from_str(&e)),
                    };
                    if let Err(e) = settled {
                        console::warn_1(
                            &format!("[proxy] promise settle failed: {}", js_error_string(&e))
                                .into(),
                        );
                    }
                }),
            );
        })
    }
}
