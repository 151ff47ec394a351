//!
//! Error types for the parameter service.
//!
//! Only failures local to the caller are errors.  A missing parameter is
//! reported by its absence from a get response, and a rejected parameter
//! by its entry in a set response; neither crosses the bus as an error.
//!

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::messages::RequestId;

/// Result type alias using ParameterError
pub type Result<T> = std::result::Result<T, ParameterError>;

/// Errors raised by parameter clients and servers
#[derive(Debug, Error)]
pub enum ParameterError {
    /// No response with a matching request id arrived from the target node
    /// before the deadline.  The call may be retried.
    #[error("no response from node '{node_id}' to request {request_id} within {timeout:?}")]
    Timeout {
        node_id: String,
        request_id: RequestId,
        timeout: Duration,
    },

    /// The client or server was shut down while the call was pending, or
    /// before it started.  Not retryable on the same instance.
    #[error("parameter client was shut down")]
    Cancelled,

    /// The client already has a pending call with this request id
    #[error("request id {0} is already pending on this client")]
    DuplicateRequestId(RequestId),

    /// Another live server on the same bus already answers for this node id
    #[error("node id '{0}' is already served on this bus")]
    NodeIdInUse(String),

    /// The node answered a request with a response of a different kind
    #[error("node '{node_id}' answered a {expected} request with a {received} response")]
    UnexpectedResponse {
        node_id: String,
        expected: &'static str,
        received: &'static str,
    },

    /// A server or client could not start its worker thread
    #[error("failed to spawn worker thread: {0}")]
    Thread(#[source] std::io::Error),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Failures loading an initial parameter set.  A load either yields every
/// parameter in the source or nothing.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read parameter file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed parameter file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("parameter '{name}' has unknown type '{kind}'")]
    UnknownType { name: String, kind: String },

    #[error("parameter '{name}' was rejected: {reason}")]
    Rejected { name: String, reason: String },

    #[error("parameter '{name}' value does not match type '{kind}': {reason}")]
    InvalidValue {
        name: String,
        kind: String,
        reason: String,
    },
}
