//! Worker Endpoint
//!
//! Runs inside the worker context that owns the engine instance.
//! Receives call requests, ensures activation, dispatches against the
//! fixed capability set, and produces exactly one correlated response
//! per request: success or failure, the request is never left
//! unanswered.
//!
//! Log lines emitted by the engine core go out as uncorrelated pushes;
//! ordering between pushes and responses is not guaranteed.

use std::rc::Rc;

use serde_json::{json, Value};

use crate::error::EndpointError;
use crate::guard::{ActivationGuard, Ensure};
use crate::protocol::{CallRequest, CallResponse, LogEvent, LogLevel};

/// Engine status reported by `mainStatus` before activation
pub const STATUS_NOT_RUNNING: i64 = 0;

/// Sink handed to the engine for its log callback
pub type EngineLogSink = Rc<dyn Fn(&str, &str)>;

/// Continuation for one capability invocation; must be called exactly
/// once with the outcome
pub type EngineCallback = Box<dyn FnOnce(Result<Value, String>)>;

/// The engine capability set: the fixed collection of named operations
/// exposed by the activated module. Invocations complete through the
/// callback (the underlying calls may be asynchronous); failures come
/// back as strings and are converted to error-shaped responses at the
/// dispatch boundary.
pub trait Engine {
    fn main_start(
        &self,
        conf: &Value,
        log: EngineLogSink,
        log_level: LogLevel,
        done: EngineCallback,
    );

    fn main_status(&self, done: EngineCallback);

    fn main_stop(&self, done: EngineCallback);

    fn rpc(&self, request: &Value, done: EngineCallback);
}

/// The supported method set, by wire name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    MainStart,
    MainStatus,
    MainStop,
    Rpc,
}

impl Method {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mainStart" => Some(Method::MainStart),
            "mainStatus" => Some(Method::MainStatus),
            "mainStop" => Some(Method::MainStop),
            "rpc" => Some(Method::Rpc),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Method::MainStart => "mainStart",
            Method::MainStatus => "mainStatus",
            Method::MainStop => "mainStop",
            Method::Rpc => "rpc",
        }
    }

    /// `mainStatus` is a pure introspection query, safe to answer
    /// before the module is active. Every other method requires
    /// activation.
    pub fn requires_activation(&self) -> bool {
        !matches!(self, Method::MainStatus)
    }
}

/// Continuation that transmits the response for one request
pub type ReplySink = Box<dyn FnOnce(CallResponse)>;

/// Started by the endpoint when a request wins the activation race;
/// must eventually call `guard.complete(..)`.
pub type Activator<E> = Box<dyn Fn(Rc<ActivationGuard<E>>)>;

/// Worker-side half of the call/response protocol
pub struct WorkerEndpoint<E: Engine + 'static> {
    guard: Rc<ActivationGuard<E>>,
    activator: Activator<E>,
    log_push: Rc<dyn Fn(LogEvent)>,
}

impl<E: Engine + 'static> WorkerEndpoint<E> {
    /// `activator` performs the load + instantiate sequence and reports
    /// to the guard; `log_push` transmits uncorrelated pushes upstream.
    pub fn new(
        guard: Rc<ActivationGuard<E>>,
        activator: Activator<E>,
        log_push: Rc<dyn Fn(LogEvent)>,
    ) -> Self {
        Self {
            guard,
            activator,
            log_push,
        }
    }

    pub fn guard(&self) -> &Rc<ActivationGuard<E>> {
        &self.guard
    }

    /// Push a log event upstream, outside the correlation space
    pub fn push_log(&self, level: &str, message: &str) {
        (self.log_push)(LogEvent::new(level, message));
    }

    /// Handle one inbound request. `reply` is invoked exactly once.
    pub fn handle_request(&self, request: CallRequest, reply: ReplySink) {
        let id = request.id;
        let method = match Method::from_name(&request.method) {
            Some(m) => m,
            None => {
                reply(CallResponse::err(
                    id,
                    EndpointError::UnknownMethod(request.method).to_string(),
                ));
                return;
            }
        };

        if !method.requires_activation() && !self.guard.is_active() {
            // Status is answerable before the module exists.
            reply(CallResponse::ok(id, json!(STATUS_NOT_RUNNING)));
            return;
        }

        let params = request.params;
        let log_sink = Rc::clone(&self.log_push);
        let ensure = self.guard.ensure_active(Box::new(move |outcome| {
            match outcome {
                Ok(engine) => {
                    let done: EngineCallback = Box::new(move |result| {
                        reply(match result {
                            Ok(value) => CallResponse::ok(id, value),
                            Err(e) => {
                                CallResponse::err(id, EndpointError::Dispatch(e).to_string())
                            }
                        });
                    });
                    dispatch(&*engine, method, &params, log_sink, done);
                }
                Err(e) => {
                    reply(CallResponse::err(id, EndpointError::from(e).to_string()));
                }
            }
        }));
        if ensure == Ensure::Start {
            (self.activator)(Rc::clone(&self.guard));
        }
    }
}

/// Invoke one capability. The engine reports through `done`; errors
/// never escape as panics, they become the `error` field of the
/// response.
fn dispatch<E: Engine>(
    engine: &E,
    method: Method,
    params: &Value,
    log_push: Rc<dyn Fn(LogEvent)>,
    done: EngineCallback,
) {
    match method {
        Method::MainStart => {
            let conf = params.get("conf").cloned().unwrap_or(Value::Null);
            let level = params
                .get("log_level")
                .map(LogLevel::from_param)
                .unwrap_or_default();
            let sink: EngineLogSink = Rc::new(move |level: &str, message: &str| {
                log_push(LogEvent::new(level, message));
            });
            engine.main_start(&conf, sink, level, done);
        }
        Method::MainStatus => engine.main_status(done),
        Method::MainStop => engine.main_stop(done),
        Method::Rpc => engine.rpc(params, done),
    }
}
