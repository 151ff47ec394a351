//!
//! Matching responses to the calls waiting for them.
//!
//! A call is registered with the correlator before its request is sent, so
//! a response can never arrive ahead of the entry it resolves.  Each entry
//! owns a single-slot channel; resolving the entry moves the response into
//! that slot and wakes exactly the waiting caller.
//!
//! A request moves through `Created -> Sent -> {Resolved, TimedOut,
//! Cancelled}`.  The three end states are terminal and a resolved or
//! expired entry is never matched again.
//!

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, Span};

use pcomm_core::Correlated;

use crate::error::{ParameterError, Result};
use crate::messages::RequestId;

/// Lifecycle of a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// The request id is allocated but nothing has been sent
    Created,
    /// The request is on the bus and the caller may be waiting
    Sent,
    /// The matching response was delivered to the caller
    Resolved,
    /// The deadline passed first
    TimedOut,
    /// The owning client shut down first
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::TimedOut | Self::Cancelled)
    }
}

enum Completion<Res> {
    Response(Res),
    Cancelled,
}

struct PendingEntry<Res> {
    /// Responses from any other node are not accepted for this entry
    node_id: String,
    tx: Sender<Completion<Res>>,
}

struct CorrelatorState<Res> {
    pending: HashMap<RequestId, PendingEntry<Res>>,
    /// Set once the correlator is cancelled; no entry is registered after
    closed: bool,
}

/// The pending-call table of one client
pub struct ResponseCorrelator<Res> {
    state: Arc<Mutex<CorrelatorState<Res>>>,
    next_request_id: Arc<AtomicU64>,
    span: Span,
}

impl<Res> Clone for ResponseCorrelator<Res> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            next_request_id: self.next_request_id.clone(),
            span: self.span.clone(),
        }
    }
}

impl<Res: Correlated + Send> ResponseCorrelator<Res> {
    pub fn new(span: Span) -> Self {
        Self {
            state: Arc::new(Mutex::new(CorrelatorState {
                pending: HashMap::new(),
                closed: false,
            })),
            next_request_id: Arc::new(AtomicU64::new(1)),
            span,
        }
    }

    /// Allocate a request id that is unique among every call this
    /// correlator has seen
    pub fn next_request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Start tracking a call to `node_id`
    pub fn begin(&self, request_id: RequestId, node_id: &str) -> PendingRequest<Res> {
        let (tx, rx) = channel::bounded(1);
        PendingRequest {
            request_id,
            node_id: node_id.to_string(),
            tx: Some(tx),
            rx,
            state: RequestState::Created,
            correlator: self.clone(),
        }
    }

    /// Deliver a response to the call waiting for it.
    ///
    /// Returns false when no call is waiting for the response.  Unknown,
    /// duplicate and late responses are dropped, as are responses whose
    /// node does not match the node the request was sent to.
    pub fn resolve(&self, response: Res) -> bool {
        let request_id = response.request_id();
        let mut state = self.state.lock();

        let expected = match state.pending.get(&request_id) {
            Some(entry) => entry.node_id == response.node_id(),
            None => {
                debug!(
                    parent: &self.span,
                    request_id,
                    node_id = response.node_id(),
                    "dropping response with no pending request"
                );
                return false;
            }
        };

        if !expected {
            debug!(
                parent: &self.span,
                request_id,
                node_id = response.node_id(),
                "dropping response from unexpected node"
            );
            return false;
        }

        match state.pending.remove(&request_id) {
            // The slot is empty and the waiter holds the receiver until it
            // removes its own entry.
            Some(entry) => entry.tx.try_send(Completion::Response(response)).is_ok(),
            None => false,
        }
    }

    /// Fail every pending call with `Cancelled` and refuse new ones
    pub fn cancel_all(&self) {
        let mut state = self.state.lock();
        state.closed = true;

        let cancelled = state.pending.len();
        for (_, entry) in state.pending.drain() {
            let _ = entry.tx.try_send(Completion::Cancelled);
        }

        if cancelled > 0 {
            debug!(parent: &self.span, cancelled, "cancelled pending requests");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// The number of calls waiting for a response
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn register(&self, request_id: RequestId, entry: PendingEntry<Res>) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ParameterError::Cancelled);
        }

        match state.pending.entry(request_id) {
            Entry::Occupied(_) => Err(ParameterError::DuplicateRequestId(request_id)),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    fn remove(&self, request_id: RequestId) {
        self.state.lock().pending.remove(&request_id);
    }
}

/// One outstanding call.
///
/// Dropping a call that has not reached a terminal state removes its
/// entry from the correlator.
pub struct PendingRequest<Res: Correlated + Send> {
    request_id: RequestId,
    node_id: String,
    tx: Option<Sender<Completion<Res>>>,
    rx: Receiver<Completion<Res>>,
    state: RequestState,
    correlator: ResponseCorrelator<Res>,
}

impl<Res: Correlated + Send> PendingRequest<Res> {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Register the call and then run `send`.
    ///
    /// Fails without running `send` when the correlator has already been
    /// cancelled, or with `DuplicateRequestId` when another call with the
    /// same request id is still pending.
    pub fn dispatch<F: FnOnce()>(&mut self, send: F) -> Result<()> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => return Ok(()),
        };

        let entry = PendingEntry {
            node_id: self.node_id.clone(),
            tx,
        };
        match self.correlator.register(self.request_id, entry) {
            Ok(()) => {}
            Err(ParameterError::Cancelled) => {
                self.state = RequestState::Cancelled;
                return Err(ParameterError::Cancelled);
            }
            // The call never left `Created`; the existing entry is untouched.
            Err(err) => return Err(err),
        }

        send();
        self.state = RequestState::Sent;
        Ok(())
    }

    /// Block until the call is resolved, cancelled, or `timeout` elapses
    pub fn wait(mut self, timeout: Duration) -> Result<Res> {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => self.complete(completion),
            Err(RecvTimeoutError::Timeout) => {
                self.correlator.remove(self.request_id);
                // A response resolved between the deadline and the removal
                // is still delivered.
                if let Ok(completion) = self.rx.try_recv() {
                    return self.complete(completion);
                }

                self.state = RequestState::TimedOut;
                Err(ParameterError::Timeout {
                    node_id: self.node_id.clone(),
                    request_id: self.request_id,
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.state = RequestState::Cancelled;
                Err(ParameterError::Cancelled)
            }
        }
    }

    fn complete(&mut self, completion: Completion<Res>) -> Result<Res> {
        match completion {
            Completion::Response(response) => {
                self.state = RequestState::Resolved;
                Ok(response)
            }
            Completion::Cancelled => {
                self.state = RequestState::Cancelled;
                Err(ParameterError::Cancelled)
            }
        }
    }
}

impl<Res: Correlated + Send> Drop for PendingRequest<Res> {
    fn drop(&mut self) {
        if self.state == RequestState::Sent {
            self.correlator.remove(self.request_id);
        }
    }
}
