// # DNS Config Manager
//
// Merges DNS configs contributed by many connections into one Corefile.
//
// ## Merge rules
//
// - A config with no search domains applies to the wildcard domain `.`
// - A domain targeted by one contributor gets `forward` with that
//   contributor's servers, in stored order
// - A domain targeted by several contributors gets `fanout` with the union
//   of their servers, deduplicated, first-seen order by contributor store order
// - Every block carries `log`; the wildcard block also carries `reload`
// - Domains whose blocks come out identical share one block
//
// ## Example
//
// ```text
// . {
// 	fanout . 10.0.0.1 10.0.0.2
// 	log
// 	reload
// }
// svc.cluster.local corp.example {
// 	forward . 10.96.0.10
// 	log
// }
// ```
//
// The rendered text is recomputed from the full entry set on every
// mutation, so it only ever depends on what is currently stored.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::traits::DnsConfig;

const ANY_DOMAIN: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Forward,
    Fanout,
}

impl Directive {
    fn as_str(self) -> &'static str {
        match self {
            Directive::Forward => "forward",
            Directive::Fanout => "fanout",
        }
    }
}

/// One rendered server block
#[derive(Debug)]
struct Block<'a> {
    domains: Vec<&'a str>,
    directive: Directive,
    ips: Vec<&'a str>,
    reload: bool,
}

impl Block<'_> {
    fn same_outcome(&self, directive: Directive, ips: &[&str], reload: bool) -> bool {
        self.directive == directive && self.reload == reload && self.ips == ips
    }
}

impl fmt::Display for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{\n\t{} .", self.domains.join(" "), self.directive.as_str())?;
        for ip in &self.ips {
            write!(f, " {}", ip)?;
        }
        f.write_str("\n\tlog\n")?;
        if self.reload {
            f.write_str("\treload\n")?;
        }
        f.write_str("}")
    }
}

/// Render a Corefile from entries in store order
fn render(entries: &[(String, DnsConfig)]) -> String {
    // domain -> contributing entry indices, both in first-seen order
    let mut domains: Vec<(&str, Vec<usize>)> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for (contributor, (_, config)) in entries.iter().enumerate() {
        if config.dns_server_ips.is_empty() {
            continue;
        }
        let targets: Vec<&str> = if config.search_domains.is_empty() {
            vec![ANY_DOMAIN]
        } else {
            config.search_domains.iter().map(String::as_str).collect()
        };

        for domain in targets {
            let slot = *slots.entry(domain).or_insert_with(|| {
                domains.push((domain, Vec::new()));
                domains.len() - 1
            });
            let contributors = &mut domains[slot].1;
            if !contributors.contains(&contributor) {
                contributors.push(contributor);
            }
        }
    }

    let mut blocks: Vec<Block<'_>> = Vec::new();
    for (domain, contributors) in domains {
        let (directive, ips) = match contributors.as_slice() {
            [only] => (
                Directive::Forward,
                entries[*only].1.dns_server_ips.iter().map(String::as_str).collect::<Vec<_>>(),
            ),
            _ => {
                let mut ips: Vec<&str> = Vec::new();
                for &contributor in &contributors {
                    for ip in &entries[contributor].1.dns_server_ips {
                        if !ips.contains(&ip.as_str()) {
                            ips.push(ip);
                        }
                    }
                }
                (Directive::Fanout, ips)
            }
        };
        let reload = domain == ANY_DOMAIN;

        match blocks
            .iter_mut()
            .find(|block| block.same_outcome(directive, &ips, reload))
        {
            Some(block) => block.domains.push(domain),
            None => blocks.push(Block {
                domains: vec![domain],
                directive,
                ips,
                reload,
            }),
        }
    }

    blocks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Default)]
struct ManagerInner {
    /// Entries in first-stored order
    entries: Vec<(String, DnsConfig)>,
    rendered: String,
}

impl ManagerInner {
    fn refresh(&mut self) {
        self.rendered = render(&self.entries);
    }
}

/// Thread-safe DNS config aggregator
///
/// # Example
///
/// ```rust
/// use nsm_core::dnscontext::DnsConfigManager;
/// use nsm_core::traits::DnsConfig;
///
/// let manager = DnsConfigManager::new();
/// manager.store("conn-1", DnsConfig::new(Vec::<String>::new(), ["10.0.0.1"]));
///
/// assert_eq!(manager.render(), ". {\n\tforward . 10.0.0.1\n\tlog\n\treload\n}");
/// ```
#[derive(Debug, Default)]
pub struct DnsConfigManager {
    inner: Mutex<ManagerInner>,
}

impl DnsConfigManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the config contributed under `key`
    ///
    /// A replaced entry keeps its original position in store order.
    pub fn store(&self, key: impl Into<String>, config: DnsConfig) {
        let key = key.into();
        let mut inner = self.inner.lock();
        match inner.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = config,
            None => inner.entries.push((key.clone(), config)),
        }
        inner.refresh();
        debug!(contributor = %key, "Stored DNS config");
    }

    /// Remove the config contributed under `key`
    ///
    /// # Returns
    ///
    /// The removed config, or `None` if nothing was stored under `key`
    pub fn remove(&self, key: &str) -> Option<DnsConfig> {
        let mut inner = self.inner.lock();
        let position = inner.entries.iter().position(|(k, _)| k == key)?;
        let (_, removed) = inner.entries.remove(position);
        inner.refresh();
        debug!(contributor = %key, "Removed DNS config");
        Some(removed)
    }

    /// Current merged configuration
    pub fn render(&self) -> String {
        self.inner.lock().rendered.clone()
    }

    /// Stored configs in first-stored order
    pub fn configs(&self) -> Vec<DnsConfig> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(_, config)| config.clone())
            .collect()
    }

    /// Number of contributors
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl fmt::Display for DnsConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
