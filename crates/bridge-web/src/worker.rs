//! Worker-context host
//!
//! Runs inside the dedicated worker that owns the engine. Listens for
//! requests on the worker's message port, drives activation through
//! the guard, and posts exactly one correlated response per request.
//!
//! The engine itself is a JS object (the instantiated module's export
//! surface); capability calls go through `Reflect` and may return
//! promises, which are awaited before the callback fires.

use std::rc::Rc;

use bridge_core::{
    ActivationError, ActivationGuard, BridgeConfig, CallRequest, Engine, EngineCallback,
    EngineLogSink, LogLevel, WireMessage, WorkerEndpoint,
};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{console, DedicatedWorkerGlobalScope, MessageEvent};

use crate::convert::{js_error_string, js_to_value, value_to_js};
use crate::loader::load_compressed;

/// Engine backed by the instantiated module's JS export object
pub struct JsEngine {
    exports: js_sys::Object,
}

impl JsEngine {
    pub fn new(exports: js_sys::Object) -> Self {
        Self { exports }
    }

    fn method(&self, name: &str) -> Result<js_sys::Function, String> {
        js_sys::Reflect::get(&self.exports, &name.into())
            .map_err(|e| js_error_string(&e))?
            .dyn_into::<js_sys::Function>()
            .map_err(|_| format!("engine export {name} is not a function"))
    }

    /// Call `name` with `args`, await the result if it is a promise,
    /// and deliver the outcome through `done`.
    fn call_capability(&self, name: &str, args: Vec<JsValue>, done: EngineCallback) {
        let function = match self.method(name) {
            Ok(f) => f,
            Err(e) => {
                done(Err(e));
                return;
            }
        };
        let array = js_sys::Array::new();
        for arg in &args {
            array.push(arg);
        }
        let returned = match function.apply(&self.exports, &array) {
            Ok(v) => v,
            Err(e) => {
                done(Err(js_error_string(&e)));
                return;
            }
        };
        spawn_local(async move {
            let settled = JsFuture::from(js_sys::Promise::resolve(&returned)).await;
            match settled {
                Ok(value) => match js_to_value(&value) {
                    Ok(value) => done(Ok(value)),
                    Err(e) => done(Err(e)),
                },
                Err(e) => done(Err(js_error_string(&e))),
            }
        });
    }
}

impl Engine for JsEngine {
    fn main_start(
        &self,
        conf: &Value,
        log: EngineLogSink,
        log_level: LogLevel,
        done: EngineCallback,
    ) {
        let conf_js = match value_to_js(conf) {
            Ok(v) => v,
            Err(e) => {
                done(Err(e));
                return;
            }
        };
        // The engine holds the log callback for its whole lifetime, so
        // the closure is leaked rather than stored.
        let log_closure = Closure::<dyn FnMut(JsValue, JsValue)>::new(
            move |level: JsValue, message: JsValue| {
                let level = level
                    .as_string()
                    .unwrap_or_else(|| LogLevel::Info.as_str().to_string());
                let message = message.as_string().unwrap_or_default();
                log(&level, &message);
            },
        );
        let log_js: JsValue = log_closure.as_ref().clone();
        log_closure.forget();

        self.call_capability(
            "mainStart",
            vec![
                conf_js,
                log_js,
                JsValue::from_str(log_level.as_str()),
            ],
            done,
        );
    }

    fn main_status(&self, done: EngineCallback) {
        self.call_capability("mainStatus", Vec::new(), done);
    }

    fn main_stop(&self, done: EngineCallback) {
        self.call_capability("mainStop", Vec::new(), done);
    }

    fn rpc(&self, request: &Value, done: EngineCallback) {
        match value_to_js(request) {
            Ok(request) => self.call_capability("rpc", vec![request], done),
            Err(e) => done(Err(e)),
        }
    }
}

/// Fetch, decompress, and instantiate the engine module.
///
/// `instantiate` is the module's JS entry point: it takes the
/// decompressed bytes and returns (a promise of) the export object.
async fn activate(
    module_url: &str,
    instantiate: &js_sys::Function,
) -> Result<JsEngine, ActivationError> {
    let bytes = load_compressed(module_url).await?;
    let buffer = js_sys::Uint8Array::from(bytes.as_slice());
    let returned = instantiate
        .call1(&JsValue::NULL, &buffer)
        .map_err(|e| ActivationError::Instantiate(js_error_string(&e)))?;
    let exports = JsFuture::from(js_sys::Promise::resolve(&returned))
        .await
        .map_err(|e| ActivationError::Instantiate(js_error_string(&e)))?;
    let exports: js_sys::Object = exports
        .dyn_into()
        .map_err(|_| ActivationError::Instantiate("module exports are not an object".to_string()))?;
    Ok(JsEngine::new(exports))
}

/// Entry point for the worker script: owns the endpoint and the
/// message listener for the lifetime of the worker.
#[wasm_bindgen]
pub struct WorkerEndpointHost {
    endpoint: Rc<WorkerEndpoint<JsEngine>>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
}

#[wasm_bindgen]
impl WorkerEndpointHost {
    /// `config` is a [`BridgeConfig`]-shaped object (null for
    /// defaults); `instantiate` turns decompressed module bytes into
    /// the engine export object.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, instantiate: js_sys::Function) -> Result<WorkerEndpointHost, JsValue> {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        let config: BridgeConfig = if config.is_null() || config.is_undefined() {
            BridgeConfig::default()
        } else {
            serde_json::from_value(js_to_value(&config)?)
                .map_err(|e| JsValue::from_str(&format!("bad bridge config: {e}")))?
        };

        let scope: DedicatedWorkerGlobalScope = js_sys::global()
            .dyn_into()
            .map_err(|_| JsValue::from_str("not running in a dedicated worker"))?;

        let push_scope = scope.clone();
        let log_push = Rc::new(move |event: bridge_core::LogEvent| {
            let message = WireMessage::LogPush(event);
            if let Err(e) = post_wire(&push_scope, &message) {
                console::warn_1(&format!("[worker] log push failed: {e}").into());
            }
        });

        let module_url = config.module_url.clone();
        let activator = Box::new(move |guard: Rc<ActivationGuard<JsEngine>>| {
            let module_url = module_url.clone();
            let instantiate = instantiate.clone();
            spawn_local(async move {
                let result = activate(&module_url, &instantiate).await;
                if let Err(e) = &result {
                    console::error_1(&format!("[worker] activation failed: {e}").into());
                }
                guard.complete(result);
            });
        });

        let endpoint = Rc::new(WorkerEndpoint::new(
            Rc::new(ActivationGuard::new()),
            activator,
            log_push,
        ));

        let handler_endpoint = Rc::clone(&endpoint);
        let reply_scope = scope.clone();
        let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let value = match js_to_value(&event.data()) {
                Ok(v) => v,
                Err(e) => {
                    console::warn_1(&format!("[worker] unreadable message: {e}").into());
                    return;
                }
            };
            let request: CallRequest = match serde_json::from_value(value) {
                Ok(r) => r,
                Err(e) => {
                    console::warn_1(&format!("[worker] malformed request: {e}").into());
                    return;
                }
            };
            let scope = reply_scope.clone();
            handler_endpoint.handle_request(
                request,
                Box::new(move |response| {
                    if let Err(e) = post_wire(&scope, &WireMessage::Response(response)) {
                        console::error_1(&format!("[worker] reply failed: {e}").into());
                    }
                }),
            );
        });
        scope.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        Ok(WorkerEndpointHost {
            endpoint,
            _onmessage: onmessage,
        })
    }

    /// Whether the engine module has been activated yet
    #[wasm_bindgen(js_name = isActive)]
    pub fn is_active(&self) -> bool {
        self.endpoint.guard().is_active()
    }
}

fn post_wire(scope: &DedicatedWorkerGlobalScope, message: &WireMessage) -> Result<(), String> {
    let value = serde_json::to_value(message).map_err(|e| e.to_string())?;
    let js = value_to_js(&value)?;
    scope.post_message(&js).map_err(|e| js_error_string(&e))
}
