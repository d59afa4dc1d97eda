//! Platform-neutral core of the engine bridge
//!
//! A browser-hosted application embeds a heavyweight compiled engine
//! and talks to it from several execution contexts: a dedicated worker
//! that owns the engine instance, UI-thread callers that must never
//! block, and browser tabs sharing one underlying instance. This crate
//! holds the protocol machinery that makes that safe:
//!
//! - `guard`: race-safe, exactly-once activation of the engine module
//! - `proxy`: caller-side call/response correlation over one-way
//!   message passing
//! - `endpoint`: worker-side dispatch against the engine capability
//!   set, with a guaranteed response per request
//! - `relay`: fan-out broadcast between connected endpoints of a
//!   shared channel
//! - `protocol`: the wire message schema crossing the worker boundary
//!
//! Everything here is single-threaded per context (interior mutability,
//! no locks); true parallelism exists only across contexts, which
//! communicate exclusively through asynchronous message passing. The
//! browser bindings live in `bridge-web`.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod guard;
pub mod protocol;
pub mod proxy;
pub mod relay;

pub use config::BridgeConfig;
pub use endpoint::{
    Engine, EngineCallback, EngineLogSink, Method, WorkerEndpoint, STATUS_NOT_RUNNING,
};
pub use error::{ActivationError, ChannelError, EndpointError, LoaderError};
pub use guard::{ActivationGuard, ActivationState, Ensure};
pub use protocol::{CallRequest, CallResponse, LogEvent, LogLevel, WireMessage};
pub use proxy::{CallProxy, CallTransport, Inbound};
pub use relay::{BroadcastRelay, DeliveryReport, PortId, RelayPort};
