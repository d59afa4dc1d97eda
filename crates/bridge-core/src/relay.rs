//! Broadcast Relay
//!
//! Runs in a shared execution context reachable by multiple
//! independent pages. Maintains the live connection set and forwards
//! every inbound message verbatim to every *other* connected endpoint
//! (the sender is excluded, so a message never echoes back to its
//! origin).
//!
//! Payloads are opaque: the relay performs no inspection or
//! validation of contents. A delivery failure to one endpoint never
//! aborts delivery to the rest; failures are collected into a
//! [`DeliveryReport`] for the boundary layer to log.

use std::cell::{Cell, RefCell};

/// Identity of one connected endpoint, assigned by the relay
pub type PortId = u64;

/// Delivery seam for one connected endpoint (a `MessagePort` in the
/// browser, a recording mock in tests). `Clone` because broadcast
/// snapshots the connection set, so a disconnect during delivery does
/// not affect sends already in progress.
pub trait RelayPort: Clone {
    type Payload;

    fn send(&self, payload: &Self::Payload) -> Result<(), String>;
}

/// Outcome of one broadcast
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Endpoints the payload reached
    pub delivered: usize,
    /// Per-endpoint failures, isolated from each other and from the
    /// sender
    pub failures: Vec<(PortId, String)>,
}

/// Fan-out relay over a set of connected endpoints
pub struct BroadcastRelay<P: RelayPort> {
    connections: RefCell<Vec<(PortId, P)>>,
    next_id: Cell<PortId>,
}

impl<P: RelayPort> BroadcastRelay<P> {
    pub fn new() -> Self {
        Self {
            connections: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Append an endpoint to the connection set
    pub fn connect(&self, port: P) -> PortId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.connections.borrow_mut().push((id, port));
        id
    }

    /// Remove an endpoint by identity. Idempotent: removing an absent
    /// or already-removed endpoint is a no-op.
    pub fn disconnect(&self, id: PortId) -> bool {
        let mut connections = self.connections.borrow_mut();
        let before = connections.len();
        connections.retain(|(port_id, _)| *port_id != id);
        connections.len() != before
    }

    /// Forward `payload` to every connected endpoint except `from`.
    ///
    /// The connection set is snapshotted first, so mutations during
    /// delivery (including disconnects) do not affect this broadcast.
    pub fn broadcast(&self, from: PortId, payload: &P::Payload) -> DeliveryReport {
        let targets: Vec<(PortId, P)> = self
            .connections
            .borrow()
            .iter()
            .filter(|(id, _)| *id != from)
            .cloned()
            .collect();

        let mut report = DeliveryReport::default();
        for (id, port) in targets {
            match port.send(payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => report.failures.push((id, e)),
            }
        }
        report
    }

    pub fn len(&self) -> usize {
        self.connections.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.borrow().is_empty()
    }
}

impl<P: RelayPort> Default for BroadcastRelay<P> {
    fn default() -> Self {
        Self::new()
    }
}
