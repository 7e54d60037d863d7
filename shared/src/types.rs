use std::collections::BTreeSet;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// One line of the DHCP lease table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub mac: String,

    pub ip: String,

    /// Lease hostname, or `Device-<last 5 of mac>` when the table stores `*`
    pub hostname: String,

    /// Lease expiry; `None` for infinite leases or an unparseable timestamp
    pub expires: Option<DateTime<Utc>>,
}

/// A device as the dashboard shows it.
/// Merged from the lease table, the filtering service, and the packet filter
/// on every listing; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalDevice {
    pub name: String,

    /// Address exactly as the winning source reported it. Also the dedup key.
    pub ip: String,

    pub mac: String,

    /// Service ids blocked by the filtering service for this device
    pub blocked_services: BTreeSet<String>,

    pub safesearch_enabled: bool,

    /// Live packet-filter state, never read from the filtering service
    pub bedtime_enabled: bool,

    pub use_global_settings: bool,

    pub filtering_enabled: bool,

    /// Expiry of the device's DHCP lease, if it has a finite one
    pub lease_expires: Option<DateTime<Utc>>,
}

/// Aggregate counters from the filtering service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub ads_blocked_today: u64,
    pub dns_queries_today: u64,
    /// Average upstream processing time, in the filtering service's own unit
    pub avg_processing_time: f64,
}
