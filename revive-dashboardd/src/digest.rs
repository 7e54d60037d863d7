use std::collections::BTreeSet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::CanonicalDevice;

/// Fields a poller cares about; field order fixes the serialized form.
#[derive(Serialize)]
struct DigestView<'a> {
    ip: &'a str,
    name: &'a str,
    mac: &'a str,
    blocked_services: &'a BTreeSet<String>,
    safesearch_enabled: bool,
    bedtime_enabled: bool,
    use_global_settings: bool,
    filtering_enabled: bool,
    lease_expires: Option<DateTime<Utc>>,
}

/// SHA-256 over the device listing, sorted by address so source order
/// does not change the result.
pub fn listing_digest(devices: &[CanonicalDevice]) -> String {
    let mut indices: Vec<usize> = (0..devices.len()).collect();
    indices.sort_by(|&a, &b| devices[a].ip.cmp(&devices[b].ip));

    let views: Vec<DigestView<'_>> = indices
        .iter()
        .map(|&i| {
            let d = &devices[i];
            DigestView {
                ip: &d.ip,
                name: &d.name,
                mac: &d.mac,
                blocked_services: &d.blocked_services,
                safesearch_enabled: d.safesearch_enabled,
                bedtime_enabled: d.bedtime_enabled,
                use_global_settings: d.use_global_settings,
                filtering_enabled: d.filtering_enabled,
                lease_expires: d.lease_expires,
            }
        })
        .collect();

    let json = serde_json::to_string(&views)
        .expect("Failed to serialize devices for hashing");

    hex::encode(Sha256::digest(json.as_bytes()))
}
