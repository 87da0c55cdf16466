// # nsm-core
//
// Control-plane chain elements for a network service mesh.
//
// ## Architecture Overview
//
// This library provides the elements that sit on the mesh's request paths:
// - **MonitorServer**: Mirrors live connections and broadcasts their lifecycle to watchers
// - **DnsConfigManager**: Merges per-connection DNS configs into one server configuration
// - **DnsContextServer**: Attaches DNS configs to connections on the chain
// - **RefreshClient**: Renews endpoint registrations before their leases run out
// - **SerialExecutor**: In-order, one-at-a-time task queue backing the monitor
//
// ## Design Principles
//
// 1. **Chain Elements**: Every element forwards to the next exactly once and never masks its error
// 2. **Bookkeeping on Success**: State changes only after the downstream call succeeded
// 3. **Non-blocking Paths**: Request and close never wait on broadcasts or renewals
// 4. **Explicit Lifecycle**: Background work stops through `shutdown()`, not through drop order

pub mod config;
pub mod dnscontext;
pub mod error;
pub mod monitor;
pub mod refresh;
pub mod serialize;
pub mod traits;

// Re-export core types for convenience
pub use config::{DnsSettings, DnsSource, NsmConfig, RefreshConfig};
pub use dnscontext::{DnsConfigManager, DnsContextServer};
pub use error::{Error, Result};
pub use monitor::{ChannelMonitorStream, MonitorServer};
pub use refresh::RefreshClient;
pub use serialize::SerialExecutor;
pub use traits::{
    EndpointRegistryClient, MonitorConnectionServer, MonitorConnectionStream, NetworkServiceServer,
};
