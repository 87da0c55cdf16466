// # Network Service Chain
//
// Defines the request/close contract every chain element implements, plus
// the connection records that flow through it.
//
// ## Chaining
//
// Elements are composed by handing each one the element that follows it:
//
// ```rust,ignore
// use std::sync::Arc;
// use nsm_core::{DnsContextServer, MonitorServer, NetworkServiceServer};
//
// let tail: Arc<dyn NetworkServiceServer> = Arc::new(endpoint);
// let dns = Arc::new(DnsContextServer::new(None, tail));
// let monitor = MonitorServer::new(dns);
//
// let conn = monitor.request(request).await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// DNS settings contributed by one party to a connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Domains these servers answer for. Empty means every domain.
    #[serde(default)]
    pub search_domains: Vec<String>,
    /// Upstream server addresses, in preference order
    #[serde(default)]
    pub dns_server_ips: Vec<String>,
}

impl DnsConfig {
    /// Create a config scoped to the given domains
    pub fn new<D, I>(search_domains: D, dns_server_ips: I) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            search_domains: search_domains.into_iter().map(Into::into).collect(),
            dns_server_ips: dns_server_ips.into_iter().map(Into::into).collect(),
        }
    }
}

/// DNS part of a connection's context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsContext {
    pub configs: Vec<DnsConfig>,
}

/// Request-scoped context attached to a connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionContext {
    #[serde(default)]
    pub dns_context: Option<DnsContext>,
}

/// One hop of the path a connection has taken through the mesh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    /// Name of the element that owns this hop
    pub name: String,
    /// Connection id as seen by that element
    pub id: String,
}

impl PathSegment {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// A live connection
///
/// Chain elements do not interpret the payload beyond `id` and
/// `context.dns_context`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique connection identifier
    pub id: String,
    /// Network service this connection belongs to
    #[serde(default)]
    pub network_service: String,
    /// Path segments, client first
    #[serde(default)]
    pub path: Vec<PathSegment>,
    /// Free-form labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub context: ConnectionContext,
}

impl Connection {
    /// Create a connection with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the network service name
    pub fn with_network_service(mut self, network_service: impl Into<String>) -> Self {
        self.network_service = network_service.into();
        self
    }

    /// Append a path segment
    pub fn with_path_segment(mut self, segment: PathSegment) -> Self {
        self.path.push(segment);
        self
    }
}

/// Request to establish (or refresh) a connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkServiceRequest {
    pub connection: Connection,
}

impl NetworkServiceRequest {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

/// A chain element on the establish/teardown path
///
/// Implementations must forward to the next element exactly once per call
/// and must not swallow its error.
#[async_trait]
pub trait NetworkServiceServer: Send + Sync {
    /// Establish a connection
    ///
    /// # Returns
    ///
    /// - `Ok(Connection)`: The connection as established downstream
    /// - `Err(Error)`: The downstream failure, unchanged
    async fn request(&self, request: NetworkServiceRequest) -> Result<Connection, crate::Error>;

    /// Tear down a connection
    async fn close(&self, connection: Connection) -> Result<(), crate::Error>;
}
