/// Facade routes consumed by the dashboard UI
pub const ROUTE_CLIENTS: &str = "/api/clients";
pub const ROUTE_CLIENTS_HASH: &str = "/api/clients/hash";
pub const ROUTE_STATS: &str = "/api/stats";
pub const ROUTE_CATEGORIES: &str = "/api/categories";
pub const ROUTE_TOGGLE_BLOCK: &str = "/api/toggle-block";
pub const ROUTE_TOGGLE_SAFESEARCH: &str = "/api/toggle-safesearch";
pub const ROUTE_TOGGLE_BEDTIME: &str = "/api/toggle-bedtime";

/// Placeholder reported when a source has no value for a field
pub const UNKNOWN: &str = "Unknown";
