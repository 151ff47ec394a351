//!
//! Parameter clients.
//!
//! A `ParameterClient` turns the request and response topics of a bus into
//! blocking calls on remote nodes.  One client may be shared by any number
//! of threads; concurrent calls are told apart by request id and never see
//! each other's responses.
//!

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::{channel::Receiver, select};
use parking_lot::Mutex;
use tracing::{debug, info_span, Span};

use pcomm_core::{Addressed, Client, Interrupt, Publisher};
use pcomm_pubsub::LocalSubscriber;

use crate::bus::ParameterBus;
use crate::config::ClientConfig;
use crate::correlator::ResponseCorrelator;
use crate::error::{ParameterError, Result};
use crate::events::ParameterEventSubscriber;
use crate::messages::{
    ClientId, DeleteParametersRequest, DeleteParametersResponse, GetParametersRequest,
    ListParametersRequest, ParameterRequest, ParameterResponse, SetParametersRequest,
    SetParametersResponse,
};
use crate::router::reply_filter;
use crate::types::Parameter;

/// Calls parameter operations on remote nodes
pub struct ParameterClient {
    id: ClientId,
    bus: ParameterBus,
    correlator: ResponseCorrelator<ParameterResponse>,
    default_timeout: Duration,
    stop: Interrupt,
    pump: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl ParameterClient {
    /// Attach a new client to `bus`
    pub fn new(bus: &ParameterBus, config: ClientConfig) -> Result<Self> {
        let id = bus.next_client_id();
        let span = config
            .span
            .unwrap_or_else(|| info_span!("parameter_client", client_id = %id));
        let correlator = ResponseCorrelator::new(span.clone());

        let responses = bus.responses().subscribe_filtered(reply_filter(id));
        let stop = Interrupt::new();
        let pump = {
            let correlator = correlator.clone();
            let span = span.clone();
            let shutdown = [bus.interrupt().receiver(), stop.receiver()];
            thread::Builder::new()
                .name(format!("{}-responses", id))
                .spawn(move || pump_responses(responses, correlator, shutdown, span))
                .map_err(ParameterError::Thread)?
        };

        Ok(Self {
            id,
            bus: bus.clone(),
            correlator,
            default_timeout: config.default_timeout,
            stop,
            pump: Mutex::new(Some(pump)),
            span,
        })
    }

    /// The id responses to this client are addressed to
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The timeout used by calls that do not give one
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// List every parameter name on `node_id`
    pub fn list_parameters(&self, node_id: &str) -> Result<Vec<String>> {
        self.list_parameters_filtered(node_id, &[], 0, self.default_timeout)
    }

    /// List the parameter names on `node_id` that start with any of
    /// `prefixes` and have fewer than `depth` separators.  No prefixes
    /// selects every name and a depth of zero does not limit depth.
    pub fn list_parameters_filtered(
        &self,
        node_id: &str,
        prefixes: &[String],
        depth: u32,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let request = ParameterRequest::List(ListParametersRequest {
            target_node_id: node_id.to_string(),
            request_id: self.next_request_id(),
            requester: self.id,
            prefixes: prefixes.to_vec(),
            depth,
        });

        match self.call(request, timeout)? {
            ParameterResponse::List(response) => Ok(response.names),
            other => Err(unexpected(node_id, "list", &other)),
        }
    }

    /// Read the named parameters from `node_id`.  Missing names are omitted.
    pub fn get_parameters(&self, node_id: &str, names: &[String]) -> Result<Vec<Parameter>> {
        self.get_parameters_timeout(node_id, names, self.default_timeout)
    }

    pub fn get_parameters_timeout(
        &self,
        node_id: &str,
        names: &[String],
        timeout: Duration,
    ) -> Result<Vec<Parameter>> {
        let request = ParameterRequest::Get(GetParametersRequest {
            target_node_id: node_id.to_string(),
            request_id: self.next_request_id(),
            requester: self.id,
            names: names.to_vec(),
        });

        match self.call(request, timeout)? {
            ParameterResponse::Get(response) => Ok(response.parameters),
            other => Err(unexpected(node_id, "get", &other)),
        }
    }

    /// Set parameters on `node_id`, with one result per parameter in order
    pub fn set_parameters(
        &self,
        node_id: &str,
        parameters: Vec<Parameter>,
    ) -> Result<SetParametersResponse> {
        self.set_parameters_timeout(node_id, parameters, self.default_timeout)
    }

    pub fn set_parameters_timeout(
        &self,
        node_id: &str,
        parameters: Vec<Parameter>,
        timeout: Duration,
    ) -> Result<SetParametersResponse> {
        let request = ParameterRequest::Set(SetParametersRequest {
            target_node_id: node_id.to_string(),
            request_id: self.next_request_id(),
            requester: self.id,
            parameters,
        });

        match self.call(request, timeout)? {
            ParameterResponse::Set(response) => Ok(response),
            other => Err(unexpected(node_id, "set", &other)),
        }
    }

    /// Delete parameters from `node_id`, with one result per name in order
    pub fn delete_parameters(
        &self,
        node_id: &str,
        names: &[String],
    ) -> Result<DeleteParametersResponse> {
        self.delete_parameters_timeout(node_id, names, self.default_timeout)
    }

    pub fn delete_parameters_timeout(
        &self,
        node_id: &str,
        names: &[String],
        timeout: Duration,
    ) -> Result<DeleteParametersResponse> {
        let request = ParameterRequest::Delete(DeleteParametersRequest {
            target_node_id: node_id.to_string(),
            request_id: self.next_request_id(),
            requester: self.id,
            names: names.to_vec(),
        });

        match self.call(request, timeout)? {
            ParameterResponse::Delete(response) => Ok(response),
            other => Err(unexpected(node_id, "delete", &other)),
        }
    }

    /// Subscribe to parameter events from every node on the bus
    pub fn subscribe_events(&self) -> ParameterEventSubscriber {
        self.bus.subscribe_events()
    }

    /// Fail every pending call with `Cancelled` and refuse new ones
    pub fn shutdown(&self) {
        self.stop.trigger();
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            if pump.join().is_err() {
                tracing::error!(parent: &self.span, "response pump panicked");
            }
        }
    }
}

impl Client for ParameterClient {
    type Request = ParameterRequest;
    type Response = ParameterResponse;
    type Error = ParameterError;

    fn next_request_id(&self) -> u64 {
        self.correlator.next_request_id()
    }

    fn call(&self, request: Self::Request, timeout: Duration) -> Result<Self::Response> {
        if self.bus.is_shutdown() || self.stop.is_triggered() {
            return Err(ParameterError::Cancelled);
        }

        let mut pending = self
            .correlator
            .begin(request.request_id(), request.target_node_id());

        debug!(
            parent: &self.span,
            kind = request.kind(),
            request_id = pending.request_id(),
            node_id = pending.node_id(),
            "sending request"
        );
        let requests = self.bus.requests();
        pending.dispatch(|| {
            if let Err(never) = requests.publish(request) {
                match never {}
            }
        })?;

        pending.wait(timeout)
    }
}

impl Drop for ParameterClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Resolve responses for one client until it or its bus shuts down, then
/// cancel whatever is still pending
fn pump_responses(
    responses: LocalSubscriber<ParameterResponse>,
    correlator: ResponseCorrelator<ParameterResponse>,
    shutdown: [Receiver<()>; 2],
    span: Span,
) {
    let [bus_shutdown, local_shutdown] = shutdown;
    loop {
        select! {
            recv(responses.receiver()) -> response => match response {
                Ok(response) => {
                    correlator.resolve(response);
                }
                Err(_) => break,
            },
            recv(bus_shutdown) -> _ => break,
            recv(local_shutdown) -> _ => break,
        }
    }

    correlator.cancel_all();
    debug!(parent: &span, "response pump stopped");
}

fn unexpected(node_id: &str, expected: &'static str, received: &ParameterResponse) -> ParameterError {
    ParameterError::UnexpectedResponse {
        node_id: node_id.to_string(),
        expected,
        received: received.kind(),
    }
}
