//! Worker endpoint tests
//!
//! A mock engine plus a controllable activator stand in for the
//! browser loader/instantiation path; replies are captured through a
//! recording sink, asserting the exactly-one-response contract.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{json, Value};

use bridge_core::endpoint::ReplySink;
use bridge_core::{
    ActivationError, ActivationGuard, CallRequest, CallResponse, Engine, EngineCallback,
    EngineLogSink, LoaderError, LogEvent, LogLevel, WorkerEndpoint, STATUS_NOT_RUNNING,
};

#[derive(Default)]
struct MockEngine {
    started: Cell<u32>,
    stopped: Cell<u32>,
    start_conf: RefCell<Option<Value>>,
    start_level: Cell<Option<LogLevel>>,
    rpc_error: RefCell<Option<String>>,
    log_sink: RefCell<Option<EngineLogSink>>,
}

impl Engine for MockEngine {
    fn main_start(
        &self,
        conf: &Value,
        log: EngineLogSink,
        log_level: LogLevel,
        done: EngineCallback,
    ) {
        self.started.set(self.started.get() + 1);
        *self.start_conf.borrow_mut() = Some(conf.clone());
        self.start_level.set(Some(log_level));
        *self.log_sink.borrow_mut() = Some(log);
        done(Ok(json!(true)));
    }

    fn main_status(&self, done: EngineCallback) {
        done(Ok(json!(3)));
    }

    fn main_stop(&self, done: EngineCallback) {
        self.stopped.set(self.stopped.get() + 1);
        done(Ok(json!(true)));
    }

    fn rpc(&self, request: &Value, done: EngineCallback) {
        match self.rpc_error.borrow().clone() {
            Some(e) => done(Err(e)),
            None => done(Ok(json!({ "echo": request }))),
        }
    }
}

struct Harness {
    endpoint: WorkerEndpoint<MockEngine>,
    /// Guard handles captured per activation start; length counts loads
    starts: Rc<RefCell<Vec<Rc<ActivationGuard<MockEngine>>>>>,
    replies: Rc<RefCell<Vec<CallResponse>>>,
    pushes: Rc<RefCell<Vec<LogEvent>>>,
}

impl Harness {
    /// `auto` completes each activation immediately with a fresh mock
    /// engine; otherwise the test settles `starts` entries by hand.
    fn new(auto: bool) -> Self {
        let guard = Rc::new(ActivationGuard::new());
        let starts: Rc<RefCell<Vec<Rc<ActivationGuard<MockEngine>>>>> =
            Rc::new(RefCell::new(Vec::new()));
        let pushes: Rc<RefCell<Vec<LogEvent>>> = Rc::new(RefCell::new(Vec::new()));

        let recorded = Rc::clone(&starts);
        let activator = Box::new(move |guard: Rc<ActivationGuard<MockEngine>>| {
            recorded.borrow_mut().push(Rc::clone(&guard));
            if auto {
                guard.complete(Ok(MockEngine::default()));
            }
        });

        let push_sink = Rc::clone(&pushes);
        let endpoint = WorkerEndpoint::new(
            guard,
            activator,
            Rc::new(move |event| push_sink.borrow_mut().push(event)),
        );

        Self {
            endpoint,
            starts,
            replies: Rc::new(RefCell::new(Vec::new())),
            pushes,
        }
    }

    fn reply_sink(&self) -> ReplySink {
        let replies = Rc::clone(&self.replies);
        Box::new(move |response| replies.borrow_mut().push(response))
    }

    fn request(&self, id: u64, method: &str, params: Value) {
        self.endpoint
            .handle_request(CallRequest::new(id, method, params), self.reply_sink());
    }

    fn load_count(&self) -> usize {
        self.starts.borrow().len()
    }

    fn settle(&self, index: usize, result: Result<MockEngine, ActivationError>) {
        let guard = Rc::clone(&self.starts.borrow()[index]);
        guard.complete(result);
    }
}

#[test]
fn unknown_method_gets_an_error_reply_naming_it() {
    let h = Harness::new(true);
    h.request(7, "bogus", json!({}));

    let replies = h.replies.borrow();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].id, 7);
    let error = replies[0].error.as_deref().unwrap();
    assert!(!error.is_empty());
    assert!(error.contains("bogus"));
    // Never triggers activation.
    assert_eq!(h.load_count(), 0);
}

#[test]
fn status_is_answerable_before_activation() {
    let h = Harness::new(true);
    h.request(1, "mainStatus", Value::Null);

    let replies = h.replies.borrow();
    assert_eq!(replies[0].result, Some(json!(STATUS_NOT_RUNNING)));
    assert_eq!(h.load_count(), 0);
}

#[test]
fn status_reflects_the_engine_once_active() {
    let h = Harness::new(true);
    h.request(1, "mainStop", Value::Null);
    h.request(2, "mainStatus", Value::Null);

    let replies = h.replies.borrow();
    assert_eq!(replies[1].result, Some(json!(3)));
    assert_eq!(h.load_count(), 1);
}

#[test]
fn concurrent_requests_share_one_activation() {
    let h = Harness::new(false);
    h.request(1, "mainStop", Value::Null);
    h.request(2, "rpc", json!({"method": "version"}));
    h.request(3, "mainStop", Value::Null);

    // One load in flight, nothing answered yet.
    assert_eq!(h.load_count(), 1);
    assert!(h.replies.borrow().is_empty());

    h.settle(0, Ok(MockEngine::default()));

    let replies = h.replies.borrow();
    assert_eq!(replies.len(), 3);
    assert!(replies.iter().all(|r| r.error.is_none()));
    assert_eq!(h.load_count(), 1);

    // Both waiting stop requests reached the one shared engine.
    let engine = h.starts.borrow()[0].engine().unwrap();
    assert_eq!(engine.stopped.get(), 2);
}

#[test]
fn activation_failure_answers_all_waiting_requests_and_allows_retry() {
    let h = Harness::new(false);
    h.request(1, "mainStop", Value::Null);
    h.request(2, "rpc", json!({}));

    h.settle(0, Err(ActivationError::Load(LoaderError::UnsupportedFormat)));

    {
        let replies = h.replies.borrow();
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|r| r.error.is_some()));
    }

    // A later request performs a fresh load rather than hanging.
    h.request(3, "mainStop", Value::Null);
    assert_eq!(h.load_count(), 2);
    h.settle(1, Ok(MockEngine::default()));
    assert_eq!(h.replies.borrow().len(), 3);
    assert!(h.replies.borrow()[2].error.is_none());
}

#[test]
fn dispatch_errors_become_error_replies_never_unanswered() {
    let h = Harness::new(false);
    h.request(1, "rpc", json!({"method": "version"}));

    let engine = MockEngine::default();
    *engine.rpc_error.borrow_mut() = Some("engine exploded".to_string());
    h.settle(0, Ok(engine));

    let replies = h.replies.borrow();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].id, 1);
    assert_eq!(replies[0].error.as_deref(), Some("engine exploded"));
}

#[test]
fn main_start_forwards_conf_level_and_a_working_log_sink() {
    let h = Harness::new(false);
    h.request(
        1,
        "mainStart",
        json!({"conf": {"netid": 8762}, "log_level": "debug"}),
    );
    h.settle(0, Ok(MockEngine::default()));

    let guard = Rc::clone(&h.starts.borrow()[0]);
    let engine = guard.engine().unwrap();
    assert_eq!(engine.started.get(), 1);
    assert_eq!(*engine.start_conf.borrow(), Some(json!({"netid": 8762})));
    assert_eq!(engine.start_level.get(), Some(LogLevel::Debug));

    // The sink handed to the engine feeds the push channel, outside
    // the correlation space.
    let sink = engine.log_sink.borrow().clone().unwrap();
    sink("info", "engine core up");
    let pushes = h.pushes.borrow();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0], LogEvent::new("info", "engine core up"));
}

#[test]
fn rpc_receives_the_whole_params_payload() {
    let h = Harness::new(true);
    let payload = json!({"method": "my_balance", "coin": "DOC"});
    h.request(5, "rpc", payload.clone());

    let replies = h.replies.borrow();
    assert_eq!(replies[0].result, Some(json!({ "echo": payload })));
}

#[test]
fn endpoint_log_pushes_carry_no_correlation_id() {
    let h = Harness::new(true);
    h.endpoint.push_log("warn", "low disk");

    let pushes = h.pushes.borrow();
    assert_eq!(pushes[0].level, "warn");
    // Serialized form is the push shape, id-free.
    let wire = serde_json::to_value(&pushes[0]).unwrap();
    assert_eq!(
        wire,
        json!({"type": "log", "level": "warn", "message": "low disk"})
    );
}
