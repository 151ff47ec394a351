//!
//! Publish-subscribe traits.
//!
//! A publisher hands samples to a topic, and the topic decides which
//! subscriptions receive them.  Topics may be shared between threads, so a
//! publisher only needs a shared reference to publish.
//!

/// Something samples can be published to.
pub trait Publisher {
    /// The sample type accepted by this publisher
    type Data;
    /// Why a sample could not be published.  In-process topics use
    /// `Infallible`.
    type Error;

    /// Publish one sample to every subscription that accepts it
    fn publish(&self, data: Self::Data) -> Result<(), Self::Error>;
}

/// Something that holds the current view of a topic.
///
/// What the current view is depends on the subscriber: the latest sample,
/// or the latest sample for each key.
pub trait Subscriber {
    /// The current view of the topic
    type Target;

    /// Take in everything that arrived since the last call and return the
    /// current view
    fn get(&mut self) -> &Self::Target;
}
