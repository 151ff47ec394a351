//!
//! Parameter change events.
//!
//! Each successful mutation of a node's parameters is published as one
//! `ParameterEvent` on the bus's retained event topic.  The topic keeps the
//! latest event of every node, so a subscriber that joins late still sees
//! the most recent change of each node.
//!

use std::{collections::HashMap, convert::Infallible, time::Duration};

use crossbeam::channel::Receiver;
use tracing::{debug, Span};

use pcomm_core::{Publisher, Subscriber};
use pcomm_pubsub::{LocalMappedSubscriber, LocalRetainedTopic};

use crate::messages::ParameterEvent;

/// Events are retained per node id
pub(crate) fn event_key(event: &ParameterEvent) -> String {
    event.node_id.clone()
}

/// Publishes a node's parameter events onto the retained event topic
pub struct ChangeEventPublisher {
    topic: LocalRetainedTopic<ParameterEvent, String>,
    span: Span,
}

impl ChangeEventPublisher {
    pub fn new(topic: LocalRetainedTopic<ParameterEvent, String>, span: Span) -> Self {
        Self { topic, span }
    }
}

impl Publisher for ChangeEventPublisher {
    type Data = ParameterEvent;
    type Error = Infallible;

    /// Empty events are never published.
    fn publish(&self, event: Self::Data) -> Result<(), Self::Error> {
        if event.is_empty() {
            return Ok(());
        }

        debug!(
            parent: &self.span,
            node_id = %event.node_id,
            new = event.new_parameters.len(),
            changed = event.changed_parameters.len(),
            deleted = event.deleted_parameters.len(),
            "publishing parameter event"
        );
        self.topic.publish(event)
    }
}

/// Receives parameter events from every node on a bus.
///
/// As a `Subscriber` it exposes the latest event per node id.
pub struct ParameterEventSubscriber {
    inner: LocalMappedSubscriber<ParameterEvent, String>,
}

impl ParameterEventSubscriber {
    pub fn new(topic: &LocalRetainedTopic<ParameterEvent, String>) -> Self {
        Self {
            inner: topic.subscribe_mapped(),
        }
    }

    /// The underlying channel, for use in `crossbeam::select!`
    pub fn receiver(&self) -> &Receiver<ParameterEvent> {
        self.inner.receiver()
    }

    /// Take every event that arrived since the last poll, in publish order
    pub fn poll_events(&mut self) -> Vec<ParameterEvent> {
        self.inner.poll()
    }

    /// Block until the next event arrives or `timeout` elapses
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<ParameterEvent> {
        self.inner.recv_timeout(timeout)
    }

    /// The latest event received from `node_id`
    pub fn latest(&mut self, node_id: &str) -> Option<&ParameterEvent> {
        self.get().get(node_id)
    }
}

impl Subscriber for ParameterEventSubscriber {
    type Target = HashMap<String, ParameterEvent>;

    fn get(&mut self) -> &Self::Target {
        self.inner.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::types::Parameter;

    fn topic() -> LocalRetainedTopic<ParameterEvent, String> {
        LocalRetainedTopic::new(Arc::new(event_key))
    }

    fn event(node_id: &str, name: &str, value: i64) -> ParameterEvent {
        let mut event = ParameterEvent::new(node_id);
        event.new_parameters.push(Parameter::new(name, value));
        event
    }

    #[test]
    fn test_empty_events_are_dropped() {
        let topic = topic();
        let publisher = ChangeEventPublisher::new(topic.clone(), Span::none());
        let mut subscriber = ParameterEventSubscriber::new(&topic);

        publisher.publish(ParameterEvent::new("robot1")).unwrap();
        assert!(subscriber.poll_events().is_empty());
        assert_eq!(topic.retained_len(), 0);
    }

    #[test]
    fn test_latest_event_per_node() {
        let topic = topic();
        let publisher = ChangeEventPublisher::new(topic.clone(), Span::none());

        publisher.publish(event("robot1", "speed", 1)).unwrap();
        publisher.publish(event("robot2", "speed", 2)).unwrap();
        publisher.publish(event("robot1", "speed", 3)).unwrap();

        let mut late = ParameterEventSubscriber::new(&topic);
        assert_eq!(late.get().len(), 2);
        assert_eq!(late.latest("robot1"), Some(&event("robot1", "speed", 3)));
        assert_eq!(late.latest("robot2"), Some(&event("robot2", "speed", 2)));
        assert_eq!(late.latest("robot3"), None);
    }

    #[test]
    fn test_events_in_publish_order() {
        let topic = topic();
        let publisher = ChangeEventPublisher::new(topic.clone(), Span::none());
        let mut subscriber = ParameterEventSubscriber::new(&topic);

        for value in 0..5 {
            publisher.publish(event("robot1", "speed", value)).unwrap();
        }

        let values: Vec<i64> = subscriber
            .poll_events()
            .iter()
            .filter_map(|event| event.new_parameters[0].value.as_integer())
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            subscriber.recv_timeout(Duration::from_millis(10)),
            None
        );
    }
}
