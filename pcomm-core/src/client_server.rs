//!
//! PComm Client Server Traits.
//!
//! Requests travel over a channel shared by every server, so each request
//! names the node it is meant for.  Servers answer with a response that
//! names the answering node and echoes the request identifier so the
//! requesting client can match it to the waiting call.
//!

use std::time::Duration;

/// A request addressed to a single node over a broadcast channel.
pub trait Addressed {
    /// The id of the node that should process this request
    fn target_node_id(&self) -> &str;

    /// The identifier the requesting client assigned to this request
    fn request_id(&self) -> u64;
}

/// A response that can be correlated back to the request that caused it.
pub trait Correlated {
    /// The id of the node that produced this response
    fn node_id(&self) -> &str;

    /// The identifier of the request this response answers
    fn request_id(&self) -> u64;
}

/// A common abstraction for clients that turn asynchronous request and
/// response messages into a blocking call.
pub trait Client {
    /// The type of data used as a request by the client
    type Request: Addressed;
    /// The type of data used as a response from the server
    type Response: Correlated;
    /// The type of error from sending a request or waiting for its response
    type Error;

    /// Allocate a request identifier that is unique among this client's
    /// outstanding calls
    fn next_request_id(&self) -> u64;

    /// Send a request to the node it is addressed to and block until the
    /// matching response arrives or `timeout` elapses
    fn call(&self, request: Self::Request, timeout: Duration) -> Result<Self::Response, Self::Error>;
}

/// A common abstraction for servers that answer requests addressed
/// to a single node.
pub trait Server {
    /// The type of data received as a request from the client
    type Request: Addressed;
    /// The type of data sent as a response to the client
    type Response: Correlated;

    /// The id of the node this server answers for
    fn node_id(&self) -> &str;

    /// Handle a single request, producing its response.
    ///
    /// Failures are encoded in the response rather than returned.
    fn handle_request(&self, request: Self::Request) -> Self::Response;

    /// Handle a collection of requests in order
    fn handle_requests(&self, mut requests: Vec<Self::Request>) -> Vec<Self::Response> {
        requests
            .drain(..)
            .map(|request| self.handle_request(request))
            .collect()
    }
}
