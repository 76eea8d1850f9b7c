//! API exposure modules
//!
//! Each exposure consumes the transport-agnostic [`Dispatcher`](super::Dispatcher)
//! and produces a Router for its protocol.

pub mod rest;

pub use rest::RestExposure;
