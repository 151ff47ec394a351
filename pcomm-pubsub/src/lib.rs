//!
//! PComm Publishers and Subscribers
//!
//! This crate contains the in-process publish-subscribe substrate the
//! parameter service runs on.  Topics deliver every published sample to
//! every live subscription whose content filter accepts it, and retained
//! topics additionally keep the most recent sample per key so that
//! subscribers joining late start from the current state.
//!

#![deny(missing_docs)]

pub mod local;
pub use local::{Filter, LocalMappedSubscriber, LocalRetainedTopic, LocalSubscriber, LocalTopic};
