use std::collections::BTreeSet;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A configured client record in the filtering service.
///
/// Fields this daemon does not touch (upstreams, tags, schedules, ...) are
/// kept in `extra` so an update writes them back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyClient {
    #[serde(default)]
    pub name: String,

    /// Addresses, macs or client ids. The first entry is the canonical address.
    #[serde(default, deserialize_with = "null_as_default")]
    pub ids: Vec<String>,

    #[serde(default = "default_true")]
    pub use_global_settings: bool,

    #[serde(default = "default_true")]
    pub filtering_enabled: bool,

    #[serde(default)]
    pub parental_enabled: bool,

    #[serde(default)]
    pub safebrowsing_enabled: bool,

    #[serde(default)]
    pub safesearch_enabled: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub blocked_services: BTreeSet<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PolicyClient {
    /// First identifier, the address this record is listed under
    pub fn canonical_address(&self) -> Option<&str> {
        self.ids.first().map(String::as_str)
    }

    pub fn has_identifier(&self, address: &str) -> bool {
        self.ids.iter().any(|id| id == address)
    }
}

/// A client the filtering service observed but nobody configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoClient {
    pub ip: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source: String,
}

/// `GET /control/clients`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub clients: Vec<PolicyClient>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auto_clients: Vec<AutoClient>,
}

impl ClientsResponse {
    /// The configured client whose identifiers contain `address`
    pub fn find_configured(&self, address: &str) -> Option<&PolicyClient> {
        self.clients.iter().find(|c| c.has_identifier(address))
    }
}

/// `POST /control/clients/update`
#[derive(Debug, Serialize)]
pub struct UpdateRequest<'a> {
    pub name: &'a str,
    pub data: &'a PolicyClient,
}

/// `GET /control/stats`, only the counters the dashboard shows
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub num_blocked_filtering: u64,
    #[serde(default)]
    pub num_dns_queries: u64,
    #[serde(default)]
    pub avg_processing_time: f64,
}

fn default_true() -> bool {
    true
}

/// The filtering service sends `null` for empty lists
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
