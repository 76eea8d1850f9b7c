//! Server module for building HTTP servers from endpoint declarations
//!
//! This module provides a `ServerBuilder` that assembles:
//! - the endpoint registry (code and YAML declarations)
//! - the request dispatcher over a record store
//! - the REST router with health and introspection routes

pub mod builder;
pub mod dispatcher;
pub mod endpoint_registry;
pub mod exposure;

pub use builder::ServerBuilder;
pub use dispatcher::{Dispatcher, RequestContext};
pub use endpoint_registry::{Endpoint, EndpointConfig, EndpointDescription, EndpointRegistry};
pub use exposure::RestExposure;
