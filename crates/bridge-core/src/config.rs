//! Bridge configuration

use serde::{Deserialize, Serialize};

use crate::protocol::LogLevel;

/// Where the bridge finds its artifacts and how verbose the engine is
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// URL of the gzip-compressed engine module
    pub module_url: String,
    /// URL of the dedicated worker script hosting the engine
    pub worker_url: String,
    /// Engine log verbosity passed to `mainStart`
    pub log_level: LogLevel,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            module_url: "engine/bin/engine_bg.wasm.gz".to_string(),
            worker_url: "engine_worker.js".to_string(),
            log_level: LogLevel::Info,
        }
    }
}
