//! Error Types for the Engine Bridge
//!
//! Loader and activation failures propagate to every caller awaiting
//! activation; endpoint failures are always converted into error-shaped
//! responses so no request is ever left unanswered.

use std::fmt;

/// Errors produced while fetching and decompressing the engine module
#[derive(Clone, Debug, PartialEq)]
pub enum LoaderError {
    /// The fetch completed with a non-success status
    Fetch {
        status: u16,
        status_text: String,
    },

    /// The host lacks the required decompression primitive
    UnsupportedFormat,

    /// The response body was unreadable or already consumed
    Stream(String),
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderError::Fetch {
                status,
                status_text,
            } => {
                write!(
                    f,
                    "Failed to fetch compressed module: {} {}",
                    status, status_text
                )
            }
            LoaderError::UnsupportedFormat => {
                write!(f, "Host does not support streaming gzip decompression")
            }
            LoaderError::Stream(msg) => write!(f, "Module stream error: {}", msg),
        }
    }
}

/// Errors produced while activating the engine module
///
/// Activation failures are delivered to every waiter of the in-flight
/// attempt, so the type is `Clone`. A failed attempt resets the guard to
/// `Uninitialized`; the failure is fatal to the attempt, not the process.
#[derive(Clone, Debug, PartialEq)]
pub enum ActivationError {
    /// Fetching or decompressing the module failed
    Load(LoaderError),

    /// The module was fetched but could not be instantiated
    Instantiate(String),
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationError::Load(e) => write!(f, "Activation failed: {}", e),
            ActivationError::Instantiate(msg) => {
                write!(f, "Module instantiation failed: {}", msg)
            }
        }
    }
}

impl From<LoaderError> for ActivationError {
    fn from(e: LoaderError) -> Self {
        ActivationError::Load(e)
    }
}

/// Errors produced by worker endpoint dispatch
///
/// Never escapes the endpoint as a thrown error: every variant becomes
/// the `error` field of the correlated response.
#[derive(Clone, Debug, PartialEq)]
pub enum EndpointError {
    /// The request named a method outside the capability set
    UnknownMethod(String),

    /// Activation failed while the request was waiting on it
    Activation(ActivationError),

    /// The engine capability invocation failed
    Dispatch(String),
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointError::UnknownMethod(name) => write!(f, "Unknown method {}", name),
            EndpointError::Activation(e) => write!(f, "{}", e),
            EndpointError::Dispatch(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<ActivationError> for EndpointError {
    fn from(e: ActivationError) -> Self {
        EndpointError::Activation(e)
    }
}

/// Errors produced by the host lifecycle channel
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelError {
    /// Required argument missing or malformed
    InvalidArguments(&'static str),

    /// The channel does not implement the named method
    NotImplemented(String),
}

impl ChannelError {
    /// Stable error code surfaced to the embedding application
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::InvalidArguments(_) => "INVALID_ARGUMENTS",
            ChannelError::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::InvalidArguments(msg) => write!(f, "{}", msg),
            ChannelError::NotImplemented(method) => {
                write!(f, "Method {} not implemented", method)
            }
        }
    }
}
