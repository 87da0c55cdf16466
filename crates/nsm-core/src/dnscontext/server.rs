//! DNS context chain element
//!
//! Stamps the connection's DNS context with the configs produced by a getter
//! before handing the request (or close) to the next element.

use async_trait::async_trait;
use std::sync::Arc;

use super::DnsConfigManager;
use crate::Result;
use crate::traits::network_service::{
    Connection, DnsConfig, DnsContext, NetworkServiceRequest, NetworkServiceServer,
};

/// Source of the DNS configs to attach to connections
pub type DnsConfigsGetter = Arc<dyn Fn() -> Vec<DnsConfig> + Send + Sync>;

/// Chain element that attaches DNS configs to connections
///
/// Without a getter the element is a passthrough.
pub struct DnsContextServer {
    get_dns_configs: Option<DnsConfigsGetter>,
    next: Arc<dyn NetworkServiceServer>,
}

impl DnsContextServer {
    /// Create an element with an optional configs getter
    pub fn new(
        get_dns_configs: Option<DnsConfigsGetter>,
        next: Arc<dyn NetworkServiceServer>,
    ) -> Self {
        Self {
            get_dns_configs,
            next,
        }
    }

    /// Create an element that attaches everything stored in `manager`
    pub fn from_manager(
        manager: Arc<DnsConfigManager>,
        next: Arc<dyn NetworkServiceServer>,
    ) -> Self {
        let getter: DnsConfigsGetter = Arc::new(move || manager.configs());
        Self::new(Some(getter), next)
    }

    fn stamp(&self, connection: &mut Connection) {
        if let Some(get_dns_configs) = &self.get_dns_configs {
            connection.context.dns_context = Some(DnsContext {
                configs: get_dns_configs(),
            });
        }
    }
}

#[async_trait]
impl NetworkServiceServer for DnsContextServer {
    async fn request(&self, mut request: NetworkServiceRequest) -> Result<Connection> {
        self.stamp(&mut request.connection);
        self.next.request(request).await
    }

    async fn close(&self, mut connection: Connection) -> Result<()> {
        self.stamp(&mut connection);
        self.next.close(connection).await
    }
}
