//! Call/Response Proxy
//!
//! Runs in a caller context and turns a named-method invocation into a
//! tagged message sent across the worker boundary, resolving the
//! matching continuation when the correlated reply arrives.
//!
//! Correlation ids are owned per proxy instance (never a shared
//! global): two independently constructed proxies can never collide on
//! id space. Concurrent invocations are independent and may complete
//! out of order; correctness depends solely on id matching.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use serde_json::Value;

use crate::protocol::{CallRequest, WireMessage};

/// Send seam for outbound messages (a `Worker` in the browser, a
/// recording mock in tests)
pub trait CallTransport {
    fn post(&self, message: &WireMessage) -> Result<(), String>;
}

/// Continuation invoked exactly once with the call outcome
pub type CallContinuation = Box<dyn FnOnce(Result<Value, String>)>;

/// Handler for uncorrelated log pushes
pub type LogHandler = Box<dyn FnMut(&str, &str)>;

/// Classification of one inbound message, surfaced to the boundary
/// layer as its observability signal (nothing is silently swallowed
/// inside the proxy).
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A pending call was resolved or rejected
    Completed(u64),
    /// Response with no outstanding entry: duplicate delivery or the
    /// caller already gave up. Non-fatal; caller should log it.
    Stale(u64),
    /// Log push delivered to the registered handler
    LogDelivered,
    /// Log push with no handler registered; discarded, never queued
    LogDiscarded,
    /// A request shape arrived at the caller side; ignored
    Unexpected,
}

/// Caller-side half of the call/response protocol
pub struct CallProxy<T: CallTransport> {
    transport: T,
    next_id: Cell<u64>,
    pending: RefCell<HashMap<u64, CallContinuation>>,
    log_handler: RefCell<Option<LogHandler>>,
}

impl<T: CallTransport> CallProxy<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: Cell::new(0),
            pending: RefCell::new(HashMap::new()),
            log_handler: RefCell::new(None),
        }
    }

    /// Send `method` with `params`, registering `on_done` for the
    /// correlated reply. Returns the allocated correlation id.
    ///
    /// If the transport rejects the send, the entry is removed again
    /// and `on_done` is invoked immediately with the transport error.
    pub fn invoke(
        &self,
        method: &str,
        params: Value,
        on_done: CallContinuation,
    ) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);

        self.pending.borrow_mut().insert(id, on_done);
        let message = WireMessage::Request(CallRequest::new(id, method, params));
        if let Err(e) = self.transport.post(&message) {
            // Drop the table borrow before running the continuation:
            // it may re-enter the proxy.
            let entry = self.pending.borrow_mut().remove(&id);
            if let Some(on_done) = entry {
                on_done(Err(e));
            }
        }
        id
    }

    /// Abandon a pending call: reject and remove the local entry
    /// without waiting for (or affecting) any in-flight engine-side
    /// work. The eventual reply, if one arrives, is classified stale.
    pub fn cancel(&self, id: u64) -> bool {
        let entry = self.pending.borrow_mut().remove(&id);
        match entry {
            Some(on_done) => {
                on_done(Err(format!("call {} cancelled", id)));
                true
            }
            None => false,
        }
    }

    /// Register the log push handler, replacing any previous one
    pub fn set_log_handler(&self, handler: LogHandler) {
        *self.log_handler.borrow_mut() = Some(handler);
    }

    pub fn clear_log_handler(&self) {
        *self.log_handler.borrow_mut() = None;
    }

    /// Process one inbound message from the worker boundary
    pub fn handle_message(&self, message: WireMessage) -> Inbound {
        match message {
            WireMessage::LogPush(event) => {
                // Take the handler out while invoking it: the handler
                // may re-register through the same proxy.
                let handler = self.log_handler.borrow_mut().take();
                match handler {
                    Some(mut handler) => {
                        handler(&event.level, &event.message);
                        let mut slot = self.log_handler.borrow_mut();
                        if slot.is_none() {
                            *slot = Some(handler);
                        }
                        Inbound::LogDelivered
                    }
                    None => Inbound::LogDiscarded,
                }
            }
            WireMessage::Response(response) => {
                let id = response.id;
                let entry = self.pending.borrow_mut().remove(&id);
                match entry {
                    Some(on_done) => {
                        on_done(response.into_outcome());
                        Inbound::Completed(id)
                    }
                    None => Inbound::Stale(id),
                }
            }
            WireMessage::Request(_) => Inbound::Unexpected,
        }
    }

    /// Remove every pending entry, handing the continuations back to
    /// the caller. Used when the far side is being torn down and no
    /// reply will ever arrive.
    pub fn drain_pending(&self) -> Vec<(u64, CallContinuation)> {
        self.pending.borrow_mut().drain().collect()
    }

    /// Outstanding entries in the pending-call table
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
