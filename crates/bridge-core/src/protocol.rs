//! Wire Message Schema
//!
//! Structured payloads exchanged across the worker boundary. The
//! transport is in-process message passing, so these are JSON object
//! shapes rather than wire bytes:
//!
//! - request:  `{ "id": 1, "method": "mainStart", "params": {...} }`
//! - response: `{ "id": 1, "result": ... }` or `{ "id": 1, "error": "..." }`
//! - push:     `{ "type": "log", "level": "info", "message": "..." }`
//!
//! Pushes never carry an `id` and are never matched against the
//! pending-call table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A correlated call request
///
/// `id` is allocated by the sending proxy: monotonically increasing,
/// never reused while an entry for it is outstanding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl CallRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// A correlated call response; `result` and `error` are mutually exclusive
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Collapse into the outcome delivered to the pending continuation.
    ///
    /// An `error` field wins over `result`; a response carrying neither
    /// resolves with `null` (the original proxy resolved with
    /// `undefined` in that case).
    pub fn into_outcome(self) -> Result<Value, String> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Marker for the push-notification shape (`"type": "log"`)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PushKind {
    #[serde(rename = "log")]
    Log,
}

/// An uncorrelated log push from the worker endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub kind: PushKind,
    pub level: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: PushKind::Log,
            level: level.into(),
            message: message.into(),
        }
    }
}

/// Any message crossing the worker boundary
///
/// Untagged: the variant is recognized by shape. Order matters:
/// `Request` requires `method` + `params` and `LogEvent` requires
/// `type` + `level` + `message`, so a bare-`id` message can only parse
/// as a `Response`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Request(CallRequest),
    LogPush(LogEvent),
    Response(CallResponse),
}

/// Engine log verbosity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "off" => Some(LogLevel::Off),
            "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Parse the `log_level` request parameter: a level name, a numeric
    /// index, or absent (defaults to `Info`).
    pub fn from_param(value: &Value) -> Self {
        match value {
            Value::String(s) => LogLevel::from_name(s).unwrap_or_default(),
            Value::Number(n) => match n.as_u64() {
                Some(0) => LogLevel::Off,
                Some(1) => LogLevel::Error,
                Some(2) => LogLevel::Warn,
                Some(3) => LogLevel::Info,
                Some(4) => LogLevel::Debug,
                Some(5) => LogLevel::Trace,
                _ => LogLevel::default(),
            },
            _ => LogLevel::default(),
        }
    }
}
