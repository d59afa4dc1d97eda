//! Call/response proxy tests
//!
//! Driven by a recording mock transport; responses are fed back by
//! hand to exercise correlation, staleness, cancellation, and log
//! push handling.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{json, Value};

use bridge_core::{
    CallProxy, CallResponse, CallTransport, Inbound, LogEvent, WireMessage,
};

#[derive(Default)]
struct MockInner {
    sent: RefCell<Vec<WireMessage>>,
    fail_next: Cell<bool>,
}

/// Cloneable handle so tests keep inspecting the transport after
/// handing it to the proxy
#[derive(Clone, Default)]
struct MockTransport(Rc<MockInner>);

impl MockTransport {
    fn sent(&self) -> std::cell::Ref<'_, Vec<WireMessage>> {
        self.0.sent.borrow()
    }

    fn fail_next(&self) {
        self.0.fail_next.set(true);
    }
}

impl CallTransport for MockTransport {
    fn post(&self, message: &WireMessage) -> Result<(), String> {
        if self.0.fail_next.take() {
            return Err("worker unreachable".to_string());
        }
        self.0.sent.borrow_mut().push(message.clone());
        Ok(())
    }
}

type Results = Rc<RefCell<Vec<(u64, Result<Value, String>)>>>;

fn proxy() -> (CallProxy<MockTransport>, MockTransport) {
    let transport = MockTransport::default();
    (CallProxy::new(transport.clone()), transport)
}

fn record(results: &Results, id_slot: Rc<Cell<u64>>) -> Box<dyn FnOnce(Result<Value, String>)> {
    let results = Rc::clone(results);
    Box::new(move |outcome| {
        results.borrow_mut().push((id_slot.get(), outcome));
    })
}

#[test]
fn out_of_order_responses_resolve_their_own_calls() {
    let (proxy, _transport) = proxy();
    let results: Results = Rc::new(RefCell::new(Vec::new()));

    let mut ids = Vec::new();
    for method in ["mainStart", "mainStatus", "rpc"] {
        let slot = Rc::new(Cell::new(0));
        let id = proxy.invoke(method, json!({}), record(&results, Rc::clone(&slot)));
        slot.set(id);
        ids.push(id);
    }
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(proxy.pending_count(), 3);

    // Replies arrive 3, 1, 2; each continuation gets its own result.
    for id in [3, 1, 2] {
        let inbound = proxy.handle_message(WireMessage::Response(CallResponse::ok(
            id,
            json!(format!("result-{}", id)),
        )));
        assert_eq!(inbound, Inbound::Completed(id));
    }

    assert_eq!(proxy.pending_count(), 0);
    let results = results.borrow();
    for (id, outcome) in results.iter() {
        assert_eq!(outcome, &Ok(json!(format!("result-{}", id))));
    }
}

#[test]
fn error_response_rejects_with_the_error_string() {
    let (proxy, _transport) = proxy();
    let outcome: Rc<RefCell<Option<Result<Value, String>>>> = Rc::new(RefCell::new(None));

    let sink = Rc::clone(&outcome);
    let id = proxy.invoke(
        "mainStop",
        Value::Null,
        Box::new(move |result| *sink.borrow_mut() = Some(result)),
    );
    proxy.handle_message(WireMessage::Response(CallResponse::err(id, "engine down")));

    assert_eq!(
        outcome.borrow().clone(),
        Some(Err("engine down".to_string()))
    );
}

#[test]
fn stale_response_is_reported_not_fatal() {
    let (proxy, _transport) = proxy();

    let inbound = proxy.handle_message(WireMessage::Response(CallResponse::ok(99, json!(1))));
    assert_eq!(inbound, Inbound::Stale(99));

    // Duplicate delivery of an already-consumed reply is also stale.
    let delivered = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&delivered);
    let id = proxy.invoke(
        "rpc",
        json!({}),
        Box::new(move |_| counter.set(counter.get() + 1)),
    );
    proxy.handle_message(WireMessage::Response(CallResponse::ok(id, json!(1))));
    let dup = proxy.handle_message(WireMessage::Response(CallResponse::ok(id, json!(1))));
    assert_eq!(dup, Inbound::Stale(id));
    assert_eq!(delivered.get(), 1);
}

#[test]
fn cancel_rejects_and_removes_the_entry() {
    let (proxy, _transport) = proxy();
    let outcome: Rc<RefCell<Option<Result<Value, String>>>> = Rc::new(RefCell::new(None));

    let sink = Rc::clone(&outcome);
    let id = proxy.invoke(
        "rpc",
        json!({}),
        Box::new(move |result| *sink.borrow_mut() = Some(result)),
    );
    assert!(proxy.cancel(id));
    assert_eq!(proxy.pending_count(), 0);
    assert!(matches!(*outcome.borrow(), Some(Err(_))));

    // Cancelling twice is a no-op, and the eventual reply is stale.
    assert!(!proxy.cancel(id));
    let late = proxy.handle_message(WireMessage::Response(CallResponse::ok(id, json!(1))));
    assert_eq!(late, Inbound::Stale(id));
}

#[test]
fn transport_failure_rejects_immediately() {
    let (proxy, transport) = proxy();
    transport.fail_next();

    let outcome: Rc<RefCell<Option<Result<Value, String>>>> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&outcome);
    proxy.invoke(
        "mainStart",
        json!({}),
        Box::new(move |result| *sink.borrow_mut() = Some(result)),
    );

    assert_eq!(proxy.pending_count(), 0);
    assert_eq!(
        outcome.borrow().clone(),
        Some(Err("worker unreachable".to_string()))
    );
}

#[test]
fn cancelled_continuation_may_retry_through_the_same_proxy() {
    // The rejection continuation re-enters the proxy to retry; the
    // pending table must be released before it runs.
    let (proxy, transport) = proxy();
    let proxy = Rc::new(proxy);

    let retry_id = Rc::new(Cell::new(0u64));
    let reentrant = Rc::clone(&proxy);
    let recorded = Rc::clone(&retry_id);
    let id = proxy.invoke(
        "rpc",
        json!({"attempt": 1}),
        Box::new(move |result| {
            assert!(result.is_err());
            let id = reentrant.invoke("rpc", json!({"attempt": 2}), Box::new(|_| {}));
            recorded.set(id);
        }),
    );

    assert!(proxy.cancel(id));

    // The retry is live in the table under a fresh id.
    assert_eq!(retry_id.get(), 2);
    assert_eq!(proxy.pending_count(), 1);
    assert_eq!(transport.sent().len(), 2);
}

#[test]
fn send_failure_continuation_may_retry_through_the_same_proxy() {
    let (proxy, transport) = proxy();
    let proxy = Rc::new(proxy);
    transport.fail_next();

    let retried = Rc::new(Cell::new(false));
    let reentrant = Rc::clone(&proxy);
    let flag = Rc::clone(&retried);
    proxy.invoke(
        "mainStart",
        json!({}),
        Box::new(move |result| {
            assert_eq!(result, Err("worker unreachable".to_string()));
            reentrant.invoke("mainStart", json!({}), Box::new(|_| {}));
            flag.set(true);
        }),
    );

    assert!(retried.get());
    assert_eq!(proxy.pending_count(), 1);
    assert_eq!(transport.sent().len(), 1);
}

#[test]
fn log_pushes_reach_the_current_handler_only() {
    let (proxy, _transport) = proxy();

    // No handler: discarded, never queued.
    let inbound = proxy.handle_message(WireMessage::LogPush(LogEvent::new("info", "early")));
    assert_eq!(inbound, Inbound::LogDiscarded);

    let seen: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    proxy.set_log_handler(Box::new(move |level, message| {
        sink.borrow_mut().push((level.to_string(), message.to_string()));
    }));

    let inbound = proxy.handle_message(WireMessage::LogPush(LogEvent::new("warn", "later")));
    assert_eq!(inbound, Inbound::LogDelivered);
    assert_eq!(
        seen.borrow().as_slice(),
        &[("warn".to_string(), "later".to_string())]
    );

    // Replacement: the first handler stops receiving pushes.
    let replacement: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&replacement);
    proxy.set_log_handler(Box::new(move |level, message| {
        sink.borrow_mut().push((level.to_string(), message.to_string()));
    }));
    proxy.handle_message(WireMessage::LogPush(LogEvent::new("error", "handover")));
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(replacement.borrow().len(), 1);

    proxy.clear_log_handler();
    let inbound = proxy.handle_message(WireMessage::LogPush(LogEvent::new("info", "gone")));
    assert_eq!(inbound, Inbound::LogDiscarded);
}

#[test]
fn correlation_ids_are_per_instance() {
    let (first, transport_a) = proxy();
    let (second, _transport_b) = proxy();

    let a = first.invoke("rpc", json!({}), Box::new(|_| {}));
    let b = second.invoke("rpc", json!({}), Box::new(|_| {}));

    // Independently constructed proxies each start their own counter.
    assert_eq!(a, 1);
    assert_eq!(b, 1);

    // And the id on the wire matches the allocated one.
    let sent = transport_a.sent();
    match &sent[0] {
        WireMessage::Request(req) => assert_eq!(req.id, a),
        other => panic!("expected request, got {:?}", other),
    }
    drop(sent);
}
