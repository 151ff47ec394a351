//!
//! The shared parameter bus.
//!
//! A bus models one publish-subscribe domain.  It carries three topics no
//! matter how many nodes or clients are attached: one for requests, one for
//! responses, and one retained topic for change events keyed by node id.
//!

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::debug;

use pcomm_core::Interrupt;
use pcomm_pubsub::{LocalRetainedTopic, LocalTopic};

use crate::error::{ParameterError, Result};
use crate::events::{event_key, ParameterEventSubscriber};
use crate::messages::{ClientId, ParameterEvent, ParameterRequest, ParameterResponse};

struct BusInner {
    requests: LocalTopic<ParameterRequest>,
    responses: LocalTopic<ParameterResponse>,
    events: LocalRetainedTopic<ParameterEvent, String>,
    /// Node ids currently answered by a live server
    claimed: Mutex<HashSet<String>>,
    next_client_id: AtomicU64,
    interrupt: Interrupt,
}

/// A handle to a parameter domain.  Clones share the same domain.
#[derive(Clone)]
pub struct ParameterBus {
    inner: Arc<BusInner>,
}

impl Default for ParameterBus {
    fn default() -> Self {
        Self {
            inner: Arc::new(BusInner {
                requests: LocalTopic::new(),
                responses: LocalTopic::new(),
                events: LocalRetainedTopic::new(Arc::new(event_key)),
                claimed: Mutex::new(HashSet::new()),
                next_client_id: AtomicU64::new(1),
                interrupt: Interrupt::new(),
            }),
        }
    }
}

impl ParameterBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The topic every request kind is published on
    pub fn requests(&self) -> &LocalTopic<ParameterRequest> {
        &self.inner.requests
    }

    /// The topic every response kind is published on
    pub fn responses(&self) -> &LocalTopic<ParameterResponse> {
        &self.inner.responses
    }

    /// The retained topic parameter events are published on
    pub fn events(&self) -> &LocalRetainedTopic<ParameterEvent, String> {
        &self.inner.events
    }

    /// Subscribe to parameter events, starting with the latest event of
    /// every node that has published one
    pub fn subscribe_events(&self) -> ParameterEventSubscriber {
        ParameterEventSubscriber::new(self.events())
    }

    /// The domain-wide shutdown signal
    pub fn interrupt(&self) -> &Interrupt {
        &self.inner.interrupt
    }

    /// Shut down every server and client attached to this bus
    pub fn shutdown(&self) {
        debug!("parameter bus shutting down");
        self.inner.interrupt.trigger();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.interrupt.is_triggered()
    }

    /// Whether a live server currently answers for `node_id`
    pub fn is_served(&self, node_id: &str) -> bool {
        self.inner.claimed.lock().contains(node_id)
    }

    pub(crate) fn next_client_id(&self) -> ClientId {
        ClientId(self.inner.next_client_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Claim `node_id` for a server.  The claim is released when the
    /// returned guard is dropped.
    pub(crate) fn claim_node(&self, node_id: &str) -> Result<NodeClaim> {
        if !self.inner.claimed.lock().insert(node_id.to_string()) {
            return Err(ParameterError::NodeIdInUse(node_id.to_string()));
        }

        Ok(NodeClaim {
            bus: self.clone(),
            node_id: node_id.to_string(),
        })
    }
}

/// Exclusive ownership of a node id on a bus
pub(crate) struct NodeClaim {
    bus: ParameterBus,
    node_id: String,
}

impl Drop for NodeClaim {
    fn drop(&mut self) {
        self.bus.inner.claimed.lock().remove(&self.node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_claims() {
        let bus = ParameterBus::new();
        let claim = bus.claim_node("robot1").unwrap();
        assert!(bus.is_served("robot1"));
        assert!(matches!(
            bus.claim_node("robot1"),
            Err(ParameterError::NodeIdInUse(id)) if id == "robot1"
        ));

        let _other = bus.claim_node("robot2").unwrap();
        drop(claim);
        assert!(!bus.is_served("robot1"));
        assert!(bus.claim_node("robot1").is_ok());
    }

    #[test]
    fn test_client_ids_are_unique() {
        let bus = ParameterBus::new();
        let first = bus.next_client_id();
        let second = bus.clone().next_client_id();
        assert_ne!(first, second);
    }

    #[test]
    fn test_shutdown() {
        let bus = ParameterBus::new();
        assert!(!bus.is_shutdown());
        bus.clone().shutdown();
        assert!(bus.is_shutdown());
    }
}
