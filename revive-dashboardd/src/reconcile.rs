use std::collections::{BTreeSet, HashSet};
use shared::protocol::UNKNOWN;
use shared::types::{CanonicalDevice, LeaseRecord};
use crate::dashboard::Dashboard;
use crate::leases::LeaseTable;
use crate::policy::models::{AutoClient, ClientsResponse, PolicyClient};

/// One source's view of a device, before merging
#[derive(Debug, Clone, Copy)]
pub enum RawDevice<'a> {
    Configured {
        record: &'a PolicyClient,
        address: &'a str,
        lease: Option<&'a LeaseRecord>,
    },
    AutoDetected {
        record: &'a AutoClient,
        lease: Option<&'a LeaseRecord>,
    },
    LeaseOnly(&'a LeaseRecord),
}

impl<'a> RawDevice<'a> {
    pub fn address(&self) -> &'a str {
        match *self {
            RawDevice::Configured { address, .. } => address,
            RawDevice::AutoDetected { record, .. } => &record.ip,
            RawDevice::LeaseOnly(lease) => &lease.ip,
        }
    }

    /// Map into the dashboard schema. Only configured records carry policy.
    pub fn into_canonical(self, bedtime_enabled: bool) -> CanonicalDevice {
        let mac = |lease: Option<&LeaseRecord>| {
            lease.map_or_else(|| UNKNOWN.to_string(), |l| l.mac.clone())
        };
        let expires = |lease: Option<&LeaseRecord>| lease.and_then(|l| l.expires);

        match self {
            RawDevice::Configured { record, address, lease } => CanonicalDevice {
                name: first_non_empty(&record.name, lease)
                    .unwrap_or_else(|| "Unknown Device".to_string()),
                ip: address.to_string(),
                mac: mac(lease),
                blocked_services: record.blocked_services.clone(),
                safesearch_enabled: record.safesearch_enabled,
                bedtime_enabled,
                use_global_settings: record.use_global_settings,
                filtering_enabled: record.filtering_enabled,
                lease_expires: expires(lease),
            },
            RawDevice::AutoDetected { record, lease } => CanonicalDevice {
                name: first_non_empty(&record.name, lease)
                    .unwrap_or_else(|| format!("Device-{}", record.ip)),
                ip: record.ip.clone(),
                mac: mac(lease),
                lease_expires: expires(lease),
                ..unmanaged(bedtime_enabled)
            },
            RawDevice::LeaseOnly(lease) => CanonicalDevice {
                name: lease.hostname.clone(),
                ip: lease.ip.clone(),
                mac: lease.mac.clone(),
                lease_expires: lease.expires,
                ..unmanaged(bedtime_enabled)
            },
        }
    }
}

fn first_non_empty(name: &str, lease: Option<&LeaseRecord>) -> Option<String> {
    if !name.is_empty() {
        return Some(name.to_string());
    }
    lease.map(|l| l.hostname.clone())
}

/// Defaults for a device the filtering service has no policy for
fn unmanaged(bedtime_enabled: bool) -> CanonicalDevice {
    CanonicalDevice {
        name: String::new(),
        ip: String::new(),
        mac: UNKNOWN.to_string(),
        blocked_services: BTreeSet::new(),
        safesearch_enabled: false,
        bedtime_enabled,
        use_global_settings: true,
        filtering_enabled: true,
        lease_expires: None,
    }
}

/// Merge the sources into one record per address.
///
/// Precedence is configured > auto-detected > lease-only. Addresses are
/// compared byte-for-byte. With no registry data every lease is listed.
pub fn merge<'a>(
    leases: &'a LeaseTable,
    registry: Option<&'a ClientsResponse>,
) -> Vec<RawDevice<'a>> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged = Vec::new();

    if let Some(registry) = registry {
        for record in &registry.clients {
            let Some(address) = record.canonical_address() else {
                tracing::warn!("Configured client {:?} has no identifiers, skipping", record.name);
                continue;
            };
            if seen.insert(address) {
                merged.push(RawDevice::Configured {
                    record,
                    address,
                    lease: leases.get(address),
                });
            }
        }

        for record in &registry.auto_clients {
            if seen.insert(&record.ip) {
                merged.push(RawDevice::AutoDetected {
                    record,
                    lease: leases.get(&record.ip),
                });
            }
        }
    }

    for lease in leases.iter() {
        if seen.insert(&lease.ip) {
            merged.push(RawDevice::LeaseOnly(lease));
        }
    }

    merged
}

impl Dashboard {
    /// Every known device, one per address. Never fails: unreachable sources
    /// shrink the listing instead.
    pub async fn list_devices(&self) -> Vec<CanonicalDevice> {
        let leases = self.read_leases().await;

        let registry = match self.registry.clients().await {
            Ok(clients) => Some(clients),
            Err(e) => {
                tracing::warn!("Client registry unavailable, listing leases only: {:#}", e);
                None
            }
        };

        let merged = merge(&leases, registry.as_ref());
        let mut devices = Vec::with_capacity(merged.len());
        for raw in merged {
            let bedtime = self.bedtime_state(raw.address()).await;
            devices.push(raw.into_canonical(bedtime));
        }

        tracing::debug!("Listed {} devices from {} leases", devices.len(), leases.len());
        devices
    }
}
