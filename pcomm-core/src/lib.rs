//!
//! PComm-Core is a collection of traits that layout the core of the
//! pcomm parameter framework.
//!
//! The traits here describe the seams between the transport substrate
//! and the services built on top of it.  Nothing in this crate knows
//! about parameters specifically.
//!

#![deny(unsafe_code)]
#![deny(missing_docs)]

pub mod publisher_subscriber;
pub use publisher_subscriber::{Publisher, Subscriber};

pub mod client_server;
pub use client_server::{Addressed, Client, Correlated, Server};

pub mod interrupt;
pub use interrupt::Interrupt;
