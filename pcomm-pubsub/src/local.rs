//!
//! Local Publishers and Subscribers
//!
//! Local topics utilize crossbeam channels to fan data out from any
//! number of publishers to any number of subscribers living in the
//! same process.
//!
//! Content filters are evaluated by the topic while publishing, so a
//! subscriber never receives (or even allocates for) data its filter
//! rejects.
//!

use std::{collections::HashMap, convert::Infallible, hash::Hash, sync::Arc, time::Duration};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use pcomm_core::{Publisher, Subscriber};

/// A content predicate installed on a subscription
pub type Filter<Data> = Arc<dyn Fn(&Data) -> bool + Send + Sync>;

/// A single registered subscription on a topic
struct Subscription<Data> {
    /// Only data accepted by the filter is delivered
    filter: Option<Filter<Data>>,
    /// The sending end of the subscriber's channel
    tx: Sender<Data>,
}

impl<Data: Clone> Subscription<Data> {
    /// Deliver data to the subscription, returning false once the
    /// subscriber has been dropped
    fn deliver(&self, data: &Data) -> bool {
        match &self.filter {
            Some(filter) if !filter(data) => true,
            _ => self.tx.send(data.clone()).is_ok(),
        }
    }
}

/// Local Subscriber that receives every sample delivered to its
/// subscription through a crossbeam channel
pub struct LocalSubscriber<Data: Clone> {
    /// The receiver end of a crossbeam channel
    rx: Receiver<Data>,
    /// The most recent data received by the subscriber
    data: Option<Data>,
}

impl<Data: Clone> LocalSubscriber<Data> {
    /// The underlying channel, for use in `crossbeam::select!`
    pub fn receiver(&self) -> &Receiver<Data> {
        &self.rx
    }

    /// Take every sample that has arrived since the last poll
    pub fn poll(&mut self) -> Vec<Data> {
        let received: Vec<Data> = self.rx.try_iter().collect();
        if let Some(last) = received.last() {
            self.data = Some(last.clone());
        }
        received
    }

    /// Block until a sample arrives or `timeout` elapses.
    ///
    /// Returns None on timeout or when the topic has been dropped.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Data> {
        match self.rx.recv_timeout(timeout) {
            Ok(data) => {
                self.data = Some(data.clone());
                Some(data)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl<Data: Clone> Subscriber for LocalSubscriber<Data> {
    type Target = Option<Data>;

    fn get(&mut self) -> &Self::Target {
        if let Some(data) = self.rx.try_iter().last() {
            self.data = Some(data);
        }

        &self.data
    }
}

/// Local topic that broadcasts every published sample to each subscription
/// whose filter accepts it.
///
/// The number of channels a topic needs is independent of how many
/// distinct consumers filter on it.
pub struct LocalTopic<Data: Clone> {
    /// Every live subscription on this topic
    subscriptions: Arc<Mutex<Vec<Subscription<Data>>>>,
}

impl<Data: Clone> Default for LocalTopic<Data> {
    fn default() -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<Data: Clone> LocalTopic<Data> {
    /// Create a new local topic
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a subscriber that receives every published sample
    pub fn subscribe(&self) -> LocalSubscriber<Data> {
        self.register(None)
    }

    /// Create a subscriber that only receives samples accepted by `filter`
    pub fn subscribe_filtered(&self, filter: Filter<Data>) -> LocalSubscriber<Data> {
        self.register(Some(filter))
    }

    /// The number of subscriptions that were alive at the last publish
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    fn register(&self, filter: Option<Filter<Data>>) -> LocalSubscriber<Data> {
        let (tx, rx) = channel::unbounded();
        self.subscriptions.lock().push(Subscription { filter, tx });
        LocalSubscriber { rx, data: None }
    }
}

impl<Data: Clone> Clone for LocalTopic<Data> {
    fn clone(&self) -> Self {
        Self {
            subscriptions: self.subscriptions.clone(),
        }
    }
}

impl<Data: Clone> Publisher for LocalTopic<Data> {
    type Data = Data;
    type Error = Infallible;

    /// Dropped subscribers are pruned as a side effect of publishing.
    fn publish(&self, data: Self::Data) -> Result<(), Self::Error> {
        self.subscriptions
            .lock()
            .retain(|subscription| subscription.deliver(&data));
        Ok(())
    }
}

/// Local subscriber that maps incoming data into a location in a hashmap
/// allowing the subscriber to maintain the latest piece of data per key.
pub struct LocalMappedSubscriber<Data: Clone, K: Eq + Hash> {
    /// The receiver end of a crossbeam channel
    rx: Receiver<Data>,
    /// The latest data received for each key
    data: HashMap<K, Data>,
    /// The function used to map incoming data to its key
    key: Arc<dyn Fn(&Data) -> K + Send + Sync>,
}

impl<Data: Clone, K: Eq + Hash> LocalMappedSubscriber<Data, K> {
    /// The underlying channel, for use in `crossbeam::select!`
    pub fn receiver(&self) -> &Receiver<Data> {
        &self.rx
    }

    /// Take every sample that has arrived since the last poll, in arrival
    /// order, while keeping the per-key map current
    pub fn poll(&mut self) -> Vec<Data> {
        let received: Vec<Data> = self.rx.try_iter().collect();
        for data in received.iter() {
            self.data.insert((self.key)(data), data.clone());
        }
        received
    }

    /// Block until a sample arrives or `timeout` elapses
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Data> {
        let data = self.rx.recv_timeout(timeout).ok()?;
        self.data.insert((self.key)(&data), data.clone());
        Some(data)
    }
}

impl<Data: Clone, K: Eq + Hash> Subscriber for LocalMappedSubscriber<Data, K> {
    type Target = HashMap<K, Data>;

    fn get(&mut self) -> &Self::Target {
        for data in self.rx.try_iter() {
            let label = (self.key)(&data);
            self.data.insert(label, data);
        }

        &self.data
    }
}

/// The shared state of a retained topic
struct RetainedState<Data, K> {
    /// Every live subscription on this topic
    subscriptions: Vec<Subscription<Data>>,
    /// The most recent sample published for each key
    retained: HashMap<K, Data>,
}

/// Local topic with a keep-last, retained delivery policy.
///
/// The most recent sample for every key is kept and replayed to each new
/// subscriber before any live data, so a late joiner immediately observes
/// the current state of every key without asking for it.
pub struct LocalRetainedTopic<Data: Clone, K: Eq + Hash + Clone> {
    /// Subscriptions and retained samples, guarded together so a new
    /// subscriber sees neither a gap nor a duplicate
    state: Arc<Mutex<RetainedState<Data, K>>>,
    /// The function used to map data to its retention key
    key: Arc<dyn Fn(&Data) -> K + Send + Sync>,
}

impl<Data: Clone, K: Eq + Hash + Clone> LocalRetainedTopic<Data, K> {
    /// Create a new retained topic that keys samples with `key`
    pub fn new(key: Arc<dyn Fn(&Data) -> K + Send + Sync>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RetainedState {
                subscriptions: Vec::new(),
                retained: HashMap::new(),
            })),
            key,
        }
    }

    /// Create a subscriber that first receives every retained sample and
    /// then every newly published one
    pub fn subscribe(&self) -> LocalSubscriber<Data> {
        LocalSubscriber {
            rx: self.register(),
            data: None,
        }
    }

    /// Create a subscriber that keeps the latest sample per key
    pub fn subscribe_mapped(&self) -> LocalMappedSubscriber<Data, K> {
        LocalMappedSubscriber {
            rx: self.register(),
            data: HashMap::new(),
            key: self.key.clone(),
        }
    }

    /// The sample currently retained for `key`
    pub fn retained(&self, key: &K) -> Option<Data> {
        self.state.lock().retained.get(key).cloned()
    }

    /// The number of keys with a retained sample
    pub fn retained_len(&self) -> usize {
        self.state.lock().retained.len()
    }

    fn register(&self) -> Receiver<Data> {
        let (tx, rx) = channel::unbounded();
        let mut state = self.state.lock();
        for data in state.retained.values() {
            // The receiver is still in scope so this cannot fail.
            let _ = tx.send(data.clone());
        }
        state.subscriptions.push(Subscription { filter: None, tx });
        rx
    }
}

impl<Data: Clone, K: Eq + Hash + Clone> Clone for LocalRetainedTopic<Data, K> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            key: self.key.clone(),
        }
    }
}

impl<Data: Clone, K: Eq + Hash + Clone> Publisher for LocalRetainedTopic<Data, K> {
    type Data = Data;
    type Error = Infallible;

    fn publish(&self, data: Self::Data) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state
            .subscriptions
            .retain(|subscription| subscription.deliver(&data));
        let key = (self.key)(&data);
        state.retained.insert(key, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use rand::random;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Data {
        key: u8,
        num: u64,
    }

    impl Data {
        pub fn new(key: u8) -> Self {
            Self { key, num: random() }
        }
    }

    fn keyed_topic() -> LocalRetainedTopic<Data, u8> {
        LocalRetainedTopic::new(Arc::new(|data: &Data| data.key))
    }

    #[test]
    fn test_local_topic_broadcast() {
        let topic = LocalTopic::new();
        let mut first = topic.subscribe();
        let mut second = topic.subscribe();

        let data = Data::new(0);
        topic.publish(data).unwrap();

        assert_eq!(first.get(), &Some(data));
        assert_eq!(second.poll(), vec![data]);
        assert_eq!(second.get(), &Some(data));
    }

    #[test]
    fn test_local_topic_filtered_subscription() {
        let topic = LocalTopic::new();
        let mut even = topic.subscribe_filtered(Arc::new(|data: &Data| data.key % 2 == 0));
        let mut everything = topic.subscribe();

        for key in 0..6 {
            topic.publish(Data::new(key)).unwrap();
        }

        let keys: Vec<u8> = even.poll().iter().map(|data| data.key).collect();
        assert_eq!(keys, vec![0, 2, 4]);
        assert_eq!(everything.poll().len(), 6);
    }

    #[test]
    fn test_local_topic_prunes_dropped_subscribers() {
        let topic = LocalTopic::new();
        let subscriber = topic.subscribe();
        let _kept = topic.subscribe();
        assert_eq!(topic.subscriber_count(), 2);

        drop(subscriber);
        topic.publish(Data::new(1)).unwrap();
        assert_eq!(topic.subscriber_count(), 1);
    }

    #[test]
    fn test_local_subscriber_recv_timeout() {
        let topic = LocalTopic::new();
        let mut subscriber = topic.subscribe();
        assert_eq!(subscriber.recv_timeout(Duration::from_millis(10)), None);

        let data = Data::new(3);
        let publisher = topic.clone();
        thread::spawn(move || publisher.publish(data).unwrap())
            .join()
            .unwrap();
        assert_eq!(subscriber.recv_timeout(Duration::from_millis(100)), Some(data));
    }

    #[test]
    fn test_retained_topic_late_joiner() {
        let topic = keyed_topic();
        let first = Data::new(1);
        let replaced = Data::new(2);
        let latest = Data::new(2);
        topic.publish(first).unwrap();
        topic.publish(replaced).unwrap();
        topic.publish(latest).unwrap();

        let mut late = topic.subscribe_mapped();
        let current = late.get();
        assert_eq!(current.len(), 2);
        assert_eq!(current.get(&1), Some(&first));
        assert_eq!(current.get(&2), Some(&latest));
        assert_eq!(topic.retained(&2), Some(latest));
        assert_eq!(topic.retained_len(), 2);
    }

    #[test]
    fn test_retained_topic_replays_before_live_data() {
        let topic = keyed_topic();
        let retained = Data::new(7);
        topic.publish(retained).unwrap();

        let mut subscriber = topic.subscribe();
        let live = Data::new(8);
        topic.publish(live).unwrap();

        assert_eq!(subscriber.poll(), vec![retained, live]);
    }
}
