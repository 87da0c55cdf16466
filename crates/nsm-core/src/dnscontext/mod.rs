// # DNS Context
//
// DNS settings travel with connections. This module aggregates them into a
// single server configuration and attaches them to connections on the chain.
//
// - DnsConfigManager: merges configs by contributor into Corefile text
// - DnsContextServer: chain element stamping configs onto connections

pub mod manager;
pub mod server;

pub use manager::DnsConfigManager;
pub use server::{DnsConfigsGetter, DnsContextServer};
