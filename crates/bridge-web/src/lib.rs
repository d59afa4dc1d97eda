//! Browser bindings for the engine bridge
//!
//! Thin wasm-bindgen layer over `bridge-core`: the loader that fetches
//! and decompresses the engine module, the main-context proxy over a
//! dedicated worker, the worker-side host that owns the engine, the
//! shared-context relay hub, and the host restart channel.
//!
//! Every type here is single-threaded within its hosting context;
//! contexts talk to each other only through `postMessage`.

mod convert;
pub mod loader;
pub mod proxy;
pub mod relay;
pub mod restart;
pub mod worker;

pub use loader::{load_compressed, supports_gzip_decompression};
pub use proxy::EngineProxy;
pub use relay::RelayHub;
pub use restart::{RestartHandler, RESTART_GRACE_MS};
pub use worker::{JsEngine, WorkerEndpointHost};
