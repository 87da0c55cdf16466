//! Core traits for the mesh chain elements
//!
//! This module defines the abstract interfaces the chain elements sit between.
//!
//! - [`NetworkServiceServer`]: Establish/teardown path
//! - [`MonitorConnectionServer`] / [`MonitorConnectionStream`]: Connection watch
//! - [`EndpointRegistryClient`]: Endpoint registration

pub mod monitor;
pub mod network_service;
pub mod registry;

pub use monitor::{
    ConnectionEvent, ConnectionEventType, MonitorConnectionServer, MonitorConnectionStream,
    MonitorScopeSelector,
};
pub use network_service::{
    Connection, ConnectionContext, DnsConfig, DnsContext, NetworkServiceRequest,
    NetworkServiceServer, PathSegment,
};
pub use registry::{
    EndpointRegistryClient, EndpointStream, NetworkServiceEndpoint, NetworkServiceEndpointQuery,
};
