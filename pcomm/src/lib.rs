//!
//! # PComm
//!
//! PComm is a distributed parameter service for node-based robotics
//! systems.
//!
//! ## Description
//!
//! Every node in a system owns a set of named, typed parameters: gains,
//! frame rates, operating modes, calibration tables.  PComm lets any part of
//! the system inspect and change those parameters at runtime by node id,
//! without the node having to know who is asking.  A node runs a
//! `ParameterServer`; everything else talks to it through a
//! `ParameterClient`.
//!
//! ## Technical Overview
//!
//! All nodes and clients share a `ParameterBus`.  The bus carries exactly
//! three topics no matter how many nodes are attached:
//!
//! * a request topic, where each server only sees requests addressed to its
//!   own node id,
//! * a response topic, where each client only sees responses to its own
//!   requests,
//! * a retained event topic, which keeps the latest change of every node so
//!   a subscriber that joins late still sees it.
//!
//! Servers answer requests on a worker pool and clients block each call
//! until the matching response arrives or the caller's timeout elapses.
//! Shutting the bus down stops every server and fails every pending call.
//!
//! ```rust
//! use pcomm::prelude::*;
//!
//! let bus = ParameterBus::new();
//! let server = ParameterServer::serve(&bus, "robot1", ServerConfig::default()).unwrap();
//! server.set_parameter("mode", "auto");
//!
//! let client = ParameterClient::new(&bus, ClientConfig::default()).unwrap();
//! let mut events = client.subscribe_events();
//! assert!(events.latest("robot1").is_some());
//!
//! let parameters = client.get_parameters("robot1", &[String::from("mode")]).unwrap();
//! assert_eq!(parameters, vec![Parameter::new("mode", "auto")]);
//! ```
//!

pub mod prelude;

/// PComm Core Traits
pub use pcomm_core as core;
/// PComm Parameter Service
pub use pcomm_parameters as parameters;
/// PComm Publishers and Subscribers
pub use pcomm_pubsub as pubsubs;
