// # Endpoint Registry Client
//
// Defines the client-side contract for registering network service
// endpoints with a registry. Registrations are leases: each carries an
// expiration time and must be renewed before it passes.
//
// The registry backend itself lives elsewhere; elements here only shape
// calls on their way to it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// A registered network service endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkServiceEndpoint {
    /// Unique endpoint name
    pub name: String,
    /// Services this endpoint provides
    #[serde(default)]
    pub network_service_names: Vec<String>,
    /// Where the endpoint can be reached
    #[serde(default)]
    pub url: String,
    /// When the registration lapses unless renewed
    #[serde(default)]
    pub expiration_time: Option<DateTime<Utc>>,
}

impl NetworkServiceEndpoint {
    /// Create an endpoint with the given name and no expiration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the expiration time
    pub fn with_expiration_time(mut self, expiration_time: DateTime<Utc>) -> Self {
        self.expiration_time = Some(expiration_time);
        self
    }

    /// Set the provided network services
    pub fn with_network_services<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.network_service_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Find query: endpoints matching the template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkServiceEndpointQuery {
    pub endpoint: NetworkServiceEndpoint,
    /// Keep the stream open for subsequent changes
    #[serde(default)]
    pub watch: bool,
}

/// Stream of endpoints returned by `find`
pub type EndpointStream = Pin<Box<dyn Stream<Item = NetworkServiceEndpoint> + Send + 'static>>;

/// A registry client chain element
///
/// Implementations must be thread-safe; the lease refresher calls
/// `register` from background tasks.
#[async_trait]
pub trait EndpointRegistryClient: Send + Sync {
    /// Register or renew an endpoint
    ///
    /// # Returns
    ///
    /// - `Ok(NetworkServiceEndpoint)`: The endpoint as accepted, possibly with an adjusted expiration
    /// - `Err(Error)`: If the registry rejected the registration
    async fn register(
        &self,
        endpoint: NetworkServiceEndpoint,
    ) -> Result<NetworkServiceEndpoint, crate::Error>;

    /// Look up endpoints
    async fn find(
        &self,
        query: NetworkServiceEndpointQuery,
    ) -> Result<EndpointStream, crate::Error>;

    /// Remove a registration
    async fn unregister(&self, endpoint: NetworkServiceEndpoint) -> Result<(), crate::Error>;
}
