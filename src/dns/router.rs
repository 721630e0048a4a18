//! Zone routing with precomputed answer sets.
//!
//! Routes are built once at startup from the configuration. Dispatch picks
//! the registered zone with the longest matching name suffix; names that
//! match no zone fall through to the upstream forwarder.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;

use hickory_proto::rr::{LowerName, Name};

use crate::config::DnsSettings;
use crate::error::{ConfigError, Result};
use crate::iface::{discover_data_ips, split_ips};

/// Zone name under which instance-data answers are served.
pub const INSTANCE_DATA_ZONE: &str = "instance-data.";

/// Fixed answers for one zone, shared read-only by all query handlers.
///
/// An empty v6 bucket means "no AAAA answers", not an error. The
/// instance-data zone always has an empty v6 bucket (IPv4-only metadata
/// emulation, kept intentionally).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSet {
    pub v4: Vec<Ipv4Addr>,
    pub v6: Vec<Ipv6Addr>,
}

#[derive(Debug)]
struct Zone {
    name: LowerName,
    labels: u8,
    answers: Arc<AnswerSet>,
}

/// Maps zone names to fixed answer sets.
///
/// Lookups returning `None` are the catch-all route: the query is relayed
/// to the upstream resolver instead of being answered locally.
#[derive(Debug, Default)]
pub struct ZoneRouter {
    zones: Vec<Zone>,
}

impl ZoneRouter {
    /// Build the routing table from the DNS settings.
    ///
    /// Registers every blackhole zone with the configured sinkhole
    /// addresses, then the `instance-data.` zone with the override or
    /// discovered interface addresses. Invalid addresses or zone names
    /// abort startup.
    pub fn build(cfg: &DnsSettings) -> Result<Self> {
        let (v4, v6) = split_ips(&cfg.ips)?;
        let blackhole = Arc::new(AnswerSet { v4, v6 });

        let mut router = Self::default();
        for zone in &cfg.zones {
            router.register(zone, Arc::clone(&blackhole))?;
        }

        let data_ips = discover_data_ips(cfg.data_ip)?;
        router.register(
            INSTANCE_DATA_ZONE,
            Arc::new(AnswerSet {
                v4: data_ips,
                v6: Vec::new(),
            }),
        )?;

        Ok(router)
    }

    /// Register a zone. Names are normalized to their fully-qualified form;
    /// registering the same exact name again replaces its answers.
    fn register(&mut self, zone: &str, answers: Arc<AnswerSet>) -> Result<()> {
        if zone.trim().is_empty() {
            return Err(ConfigError::EmptyZoneName.into());
        }

        let fqdn = if zone.ends_with('.') {
            zone.to_string()
        } else {
            format!("{zone}.")
        };

        let name = Name::from_str(&fqdn).map_err(|_| ConfigError::InvalidZone {
            value: zone.to_string(),
        })?;
        let labels = name.num_labels();
        let name = LowerName::from(&name);

        match self.zones.iter_mut().find(|z| z.name == name) {
            Some(existing) => existing.answers = answers,
            None => self.zones.push(Zone {
                name,
                labels,
                answers,
            }),
        }

        Ok(())
    }

    /// Find the answer set for a queried name, preferring the longest
    /// matching zone suffix. `None` means the query is forwarded upstream.
    pub fn lookup(&self, qname: &LowerName) -> Option<&Arc<AnswerSet>> {
        self.zones
            .iter()
            .filter(|zone| zone.name.zone_of(qname))
            .max_by_key(|zone| zone.labels)
            .map(|zone| &zone.answers)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.zones.len()
    }
}
