//! Shared-context relay hub
//!
//! Lives in a context reachable by several pages at once (a shared
//! worker). Each page hands over a `MessagePort`; anything a page
//! sends is forwarded verbatim to every other connected page.
//!
//! The hub keeps each port's listener closures alive until the port is
//! disconnected. When a port closes itself, the closures are released
//! from a deferred task: a closure must never be dropped from inside
//! its own invocation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bridge_core::{BroadcastRelay, PortId, RelayPort};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{console, MessageEvent, MessagePort};

use crate::convert::js_error_string;

/// One connected page, addressed through its `MessagePort`
#[derive(Clone)]
pub struct PortHandle {
    port: MessagePort,
}

impl RelayPort for PortHandle {
    type Payload = JsValue;

    fn send(&self, payload: &JsValue) -> Result<(), String> {
        self.port.post_message(payload).map_err(|e| js_error_string(&e))
    }
}

struct PortListeners {
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
    _onclose: Closure<dyn FnMut(MessageEvent)>,
}

/// Fan-out hub over the connected pages
#[wasm_bindgen]
pub struct RelayHub {
    relay: Rc<BroadcastRelay<PortHandle>>,
    listeners: Rc<RefCell<HashMap<PortId, PortListeners>>>,
}

#[wasm_bindgen]
impl RelayHub {
    #[wasm_bindgen(constructor)]
    pub fn new() -> RelayHub {
        RelayHub {
            relay: Rc::new(BroadcastRelay::new()),
            listeners: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Register a page's port. Messages it sends from now on are
    /// relayed to every other connected port; it never receives its
    /// own messages back.
    pub fn connect(&self, port: MessagePort) -> u64 {
        let id = self.relay.connect(PortHandle { port: port.clone() });

        let relay = Rc::clone(&self.relay);
        let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let report = relay.broadcast(id, &event.data());
            for (target, error) in &report.failures {
                console::warn_1(
                    &format!("[relay] delivery from {id} to {target} failed: {error}").into(),
                );
            }
        });
        port.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        // The port signals teardown with a close event. The listener
        // entry is removed from a deferred task so this closure is not
        // dropped while it is still executing.
        let relay = Rc::clone(&self.relay);
        let listeners = Rc::clone(&self.listeners);
        let onclose = Closure::<dyn FnMut(MessageEvent)>::new(move |_event: MessageEvent| {
            relay.disconnect(id);
            console::log_1(&format!("[relay] port {id} closed").into());
            let listeners = Rc::clone(&listeners);
            wasm_bindgen_futures::spawn_local(async move {
                listeners.borrow_mut().remove(&id);
            });
        });
        if let Err(e) =
            port.add_event_listener_with_callback("close", onclose.as_ref().unchecked_ref())
        {
            console::warn_1(
                &format!("[relay] close listener rejected: {}", js_error_string(&e)).into(),
            );
        }

        port.start();
        self.listeners.borrow_mut().insert(
            id,
            PortListeners {
                _onmessage: onmessage,
                _onclose: onclose,
            },
        );
        id
    }

    /// Remove a port from the relay and release its listeners.
    /// Idempotent.
    pub fn disconnect(&self, id: u64) -> bool {
        let removed = self.relay.disconnect(id);
        self.listeners.borrow_mut().remove(&id);
        removed
    }

    /// Number of connected ports
    pub fn len(&self) -> usize {
        self.relay.len()
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}
