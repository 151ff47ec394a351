//!
//! Addressed delivery over shared topics.
//!
//! Every server subscribes to the one request topic with a predicate on the
//! request's target node, and every client subscribes to the one response
//! topic with a predicate on the requester.  The predicates run inside the
//! topic, so servers and clients never see traffic meant for someone else
//! and the channel count does not grow with the number of nodes.
//!

use std::sync::Arc;

use pcomm_core::Addressed;
use pcomm_pubsub::{Filter, LocalSubscriber, LocalTopic};

use crate::messages::{ClientId, ParameterResponse};

/// Routes requests addressed to one node id to that node's server
#[derive(Debug, Clone)]
pub struct RequestRouter {
    node_id: String,
}

impl RequestRouter {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Whether `request` is addressed to this router's node
    pub fn accepts<R: Addressed>(&self, request: &R) -> bool {
        request.target_node_id() == self.node_id
    }

    /// The predicate `target_node_id == node_id`
    pub fn filter<R: Addressed + 'static>(&self) -> Filter<R> {
        let router = self.clone();
        Arc::new(move |request: &R| router.accepts(request))
    }

    /// Subscribe to the requests on `topic` that are addressed to this node
    pub fn route<R: Addressed + Clone + 'static>(&self, topic: &LocalTopic<R>) -> LocalSubscriber<R> {
        topic.subscribe_filtered(self.filter())
    }
}

/// The predicate `requester == client`
pub fn reply_filter(client: ClientId) -> Filter<ParameterResponse> {
    Arc::new(move |response: &ParameterResponse| response.requester() == client)
}
