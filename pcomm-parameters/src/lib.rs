//!
//! # PComm Parameters
//!
//! A distributed parameter service.  Every node owns a set of named, typed
//! parameters and serves them over a shared bus; any client on the bus can
//! list, read, write, and delete the parameters of any node by node id, and
//! every change is published as an event that late subscribers still see.
//!
//! The bus carries a fixed number of topics.  Requests are routed to the
//! addressed node by a content filter, and responses are routed back to the
//! requesting client and matched to the waiting call by request id.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use pcomm_parameters::{
//!     ClientConfig, Parameter, ParameterBus, ParameterClient, ParameterServer, ServerConfig,
//! };
//!
//! let bus = ParameterBus::new();
//! let _server = ParameterServer::serve(&bus, "robot1", ServerConfig::default()).unwrap();
//! let client = ParameterClient::new(&bus, ClientConfig::default()).unwrap();
//!
//! let response = client
//!     .set_parameters("robot1", vec![Parameter::new("camera.fps", 30i64)])
//!     .unwrap();
//! assert!(response.results[0].successful);
//!
//! let names = client
//!     .list_parameters_filtered("robot1", &[String::from("camera")], 0, Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(names, vec![String::from("camera.fps")]);
//! ```
//!

#![deny(unsafe_code)]

pub mod types;
pub use types::{Parameter, ParameterType, ParameterValue, SetParametersResult};

pub mod messages;
pub use messages::{
    ClientId, DeleteParametersRequest, DeleteParametersResponse, GetParametersRequest,
    GetParametersResponse, ListParametersRequest, ListParametersResponse, ParameterEvent,
    ParameterRequest, ParameterResponse, RequestId, SetParametersRequest, SetParametersResponse,
};

pub mod error;
pub use error::{LoadError, ParameterError, Result};

pub mod config;
pub use config::{
    ClientConfig, ClientConfigBuilder, ParameterLimits, ServerConfig, ServerConfigBuilder,
    SetCallback, DEFAULT_TIMEOUT, DEFAULT_WORKER_THREADS,
};

pub mod store;
pub use store::{MutationOutcome, ParameterStore};

pub mod events;
pub use events::{ChangeEventPublisher, ParameterEventSubscriber};

pub mod bus;
pub use bus::ParameterBus;

pub mod router;
pub use router::RequestRouter;

pub mod correlator;
pub use correlator::{PendingRequest, RequestState, ResponseCorrelator};

pub mod dispatcher;
pub use dispatcher::{RequestHandler, ServerDispatcher};

pub mod server;
pub use server::ParameterServer;

pub mod client;
pub use client::ParameterClient;

pub mod yaml;
pub use yaml::{load_from_str, load_from_yaml};
