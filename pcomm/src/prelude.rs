//!
//! The PComm prelude re-exports the types most programs need.
//!

pub use pcomm_core::{Client, Interrupt, Publisher, Server, Subscriber};

pub use pcomm_parameters::{
    ClientConfig, LoadError, Parameter, ParameterBus, ParameterClient, ParameterError,
    ParameterEvent, ParameterEventSubscriber, ParameterLimits, ParameterServer, ParameterType,
    ParameterValue, ServerConfig, SetParametersResult,
};
