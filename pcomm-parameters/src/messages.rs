//!
//! Request, response and event messages exchanged over the parameter bus.
//!
//! Every request names its target node and its requester; every response
//! names the answering node and echoes the request id and requester.  Events
//! are not addressed and are retained per node id.
//!

use std::fmt;

use pcomm_core::{Addressed, Correlated};

use crate::types::{Parameter, SetParametersResult};

/// Identifier a client assigns to each of its requests
pub type RequestId = u64;

/// Identifier of a client on a parameter bus.
///
/// Responses are routed back to the client whose id they carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Replace the values of the named parameters on a node, inserting the
/// ones that do not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct SetParametersRequest {
    pub target_node_id: String,
    pub request_id: RequestId,
    pub requester: ClientId,
    pub parameters: Vec<Parameter>,
}

/// One result per requested parameter, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct SetParametersResponse {
    pub node_id: String,
    pub request_id: RequestId,
    pub requester: ClientId,
    pub results: Vec<SetParametersResult>,
}

/// Read the named parameters from a node.
#[derive(Debug, Clone, PartialEq)]
pub struct GetParametersRequest {
    pub target_node_id: String,
    pub request_id: RequestId,
    pub requester: ClientId,
    pub names: Vec<String>,
}

/// The requested parameters that exist, in request order.  Missing names
/// are omitted.
#[derive(Debug, Clone, PartialEq)]
pub struct GetParametersResponse {
    pub node_id: String,
    pub request_id: RequestId,
    pub requester: ClientId,
    pub parameters: Vec<Parameter>,
}

/// List the parameter names held by a node.
///
/// An empty prefix list selects every name.  A non-zero depth excludes
/// names containing `depth` or more `.` separators.
#[derive(Debug, Clone, PartialEq)]
pub struct ListParametersRequest {
    pub target_node_id: String,
    pub request_id: RequestId,
    pub requester: ClientId,
    pub prefixes: Vec<String>,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListParametersResponse {
    pub node_id: String,
    pub request_id: RequestId,
    pub requester: ClientId,
    pub names: Vec<String>,
}

/// Remove the named parameters from a node.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteParametersRequest {
    pub target_node_id: String,
    pub request_id: RequestId,
    pub requester: ClientId,
    pub names: Vec<String>,
}

/// One result per requested name, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteParametersResponse {
    pub node_id: String,
    pub request_id: RequestId,
    pub requester: ClientId,
    pub results: Vec<SetParametersResult>,
}

/// The diff produced by a single mutation of one node's parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterEvent {
    /// The node whose parameters changed
    pub node_id: String,
    /// Wall-clock time of the mutation in nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
    /// Parameters that did not exist before the mutation
    pub new_parameters: Vec<Parameter>,
    /// Parameters that existed before the mutation and were written
    pub changed_parameters: Vec<Parameter>,
    /// Parameters removed by the mutation, with their last value
    pub deleted_parameters: Vec<Parameter>,
}

impl ParameterEvent {
    /// Create an empty event for a node
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    /// Whether the event describes no change at all
    pub fn is_empty(&self) -> bool {
        self.new_parameters.is_empty()
            && self.changed_parameters.is_empty()
            && self.deleted_parameters.is_empty()
    }
}

macro_rules! addressed_message {
    ($message: ident) => {
        impl Addressed for $message {
            fn target_node_id(&self) -> &str {
                &self.target_node_id
            }

            fn request_id(&self) -> u64 {
                self.request_id
            }
        }
    };
}

macro_rules! correlated_message {
    ($message: ident) => {
        impl Correlated for $message {
            fn node_id(&self) -> &str {
                &self.node_id
            }

            fn request_id(&self) -> u64 {
                self.request_id
            }
        }
    };
}

addressed_message!(SetParametersRequest);
addressed_message!(GetParametersRequest);
addressed_message!(ListParametersRequest);
addressed_message!(DeleteParametersRequest);

correlated_message!(SetParametersResponse);
correlated_message!(GetParametersResponse);
correlated_message!(ListParametersResponse);
correlated_message!(DeleteParametersResponse);

/// Every request kind carried on the shared request topic.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterRequest {
    Set(SetParametersRequest),
    Get(GetParametersRequest),
    List(ListParametersRequest),
    Delete(DeleteParametersRequest),
}

impl ParameterRequest {
    /// The client that sent this request
    pub fn requester(&self) -> ClientId {
        match self {
            Self::Set(request) => request.requester,
            Self::Get(request) => request.requester,
            Self::List(request) => request.requester,
            Self::Delete(request) => request.requester,
        }
    }

    /// A short name for the request kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Get(_) => "get",
            Self::List(_) => "list",
            Self::Delete(_) => "delete",
        }
    }
}

impl Addressed for ParameterRequest {
    fn target_node_id(&self) -> &str {
        match self {
            Self::Set(request) => request.target_node_id(),
            Self::Get(request) => request.target_node_id(),
            Self::List(request) => request.target_node_id(),
            Self::Delete(request) => request.target_node_id(),
        }
    }

    fn request_id(&self) -> u64 {
        match self {
            Self::Set(request) => Addressed::request_id(request),
            Self::Get(request) => Addressed::request_id(request),
            Self::List(request) => Addressed::request_id(request),
            Self::Delete(request) => Addressed::request_id(request),
        }
    }
}

/// Every response kind carried on the shared response topic.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterResponse {
    Set(SetParametersResponse),
    Get(GetParametersResponse),
    List(ListParametersResponse),
    Delete(DeleteParametersResponse),
}

impl ParameterResponse {
    /// The client this response is addressed to
    pub fn requester(&self) -> ClientId {
        match self {
            Self::Set(response) => response.requester,
            Self::Get(response) => response.requester,
            Self::List(response) => response.requester,
            Self::Delete(response) => response.requester,
        }
    }

    /// A short name for the response kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Get(_) => "get",
            Self::List(_) => "list",
            Self::Delete(_) => "delete",
        }
    }
}

impl Correlated for ParameterResponse {
    fn node_id(&self) -> &str {
        match self {
            Self::Set(response) => response.node_id(),
            Self::Get(response) => response.node_id(),
            Self::List(response) => response.node_id(),
            Self::Delete(response) => response.node_id(),
        }
    }

    fn request_id(&self) -> u64 {
        match self {
            Self::Set(response) => Correlated::request_id(response),
            Self::Get(response) => Correlated::request_id(response),
            Self::List(response) => Correlated::request_id(response),
            Self::Delete(response) => Correlated::request_id(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_addressing() {
        let request = ParameterRequest::Get(GetParametersRequest {
            target_node_id: String::from("robot1"),
            request_id: 7,
            requester: ClientId(3),
            names: vec![String::from("speed")],
        });

        assert_eq!(request.target_node_id(), "robot1");
        assert_eq!(Addressed::request_id(&request), 7);
        assert_eq!(request.requester(), ClientId(3));
        assert_eq!(request.kind(), "get");
    }

    #[test]
    fn test_response_correlation() {
        let response = ParameterResponse::List(ListParametersResponse {
            node_id: String::from("robot2"),
            request_id: 11,
            requester: ClientId(1),
            names: Vec::new(),
        });

        assert_eq!(response.node_id(), "robot2");
        assert_eq!(Correlated::request_id(&response), 11);
        assert_eq!(response.requester(), ClientId(1));
        assert_eq!(response.kind(), "list");
    }

    #[test]
    fn test_empty_event() {
        let mut event = ParameterEvent::new("robot1");
        assert!(event.is_empty());
        event
            .deleted_parameters
            .push(Parameter::new("speed", 1.0));
        assert!(!event.is_empty());
        assert_eq!(ClientId(4).to_string(), "client-4");
    }
}
