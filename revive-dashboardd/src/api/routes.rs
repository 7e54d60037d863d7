use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::protocol::{
    ROUTE_CATEGORIES, ROUTE_CLIENTS, ROUTE_CLIENTS_HASH, ROUTE_STATS, ROUTE_TOGGLE_BEDTIME,
    ROUTE_TOGGLE_BLOCK, ROUTE_TOGGLE_SAFESEARCH,
};
use shared::types::{CanonicalDevice, DashboardStats};
use crate::categories::CategoryTable;
use crate::dashboard::Dashboard;
use crate::digest::listing_digest;
use crate::upsert::{ApplyError, ApplyOutcome, PolicyChanges, RegistryWrite};

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
    pub categories: Arc<CategoryTable>,
}

/// A listed device plus the on/off state of each category
#[derive(Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: CanonicalDevice,
    pub categories: BTreeMap<String, bool>,
}

#[derive(Serialize)]
pub struct ClientsResponse {
    pub clients: Vec<DeviceView>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleBlockRequest {
    pub ip: Option<String>,
    pub category: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub ip: Option<String>,
    pub enabled: Option<bool>,
}

/// Error response with a `{"error": ...}` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<ApplyError> for ApiError {
    fn from(err: ApplyError) -> Self {
        let status = match err {
            ApplyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!("Failed to update client: {:?}", err);
        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// Malformed or non-JSON bodies get the same `{"error": ...}` shape
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(ROUTE_CLIENTS, get(get_clients))
        .route(ROUTE_CLIENTS_HASH, get(get_clients_hash))
        .route(ROUTE_STATS, get(get_stats))
        .route(ROUTE_CATEGORIES, get(get_categories))
        .route(ROUTE_TOGGLE_BLOCK, post(toggle_block))
        .route(ROUTE_TOGGLE_SAFESEARCH, post(toggle_safesearch))
        .route(ROUTE_TOGGLE_BEDTIME, post(toggle_bedtime))
        .with_state(state)
}

async fn get_clients(State(state): State<AppState>) -> Json<ClientsResponse> {
    let clients = state
        .dashboard
        .list_devices()
        .await
        .into_iter()
        .map(|device| DeviceView {
            categories: state.categories.view(&device.blocked_services),
            device,
        })
        .collect();

    Json(ClientsResponse { clients })
}

async fn get_clients_hash(State(state): State<AppState>) -> String {
    listing_digest(&state.dashboard.list_devices().await)
}

async fn get_stats(State(state): State<AppState>) -> Json<DashboardStats> {
    Json(state.dashboard.stats().await)
}

async fn get_categories(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, BTreeSet<String>>> {
    Json(state.categories.as_map().clone())
}

async fn toggle_block(
    State(state): State<AppState>,
    payload: Result<Json<ToggleBlockRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let (Some(ip), Some(category)) = (non_empty(req.ip), non_empty(req.category)) else {
        return Err(ApiError::bad_request("Missing parameters"));
    };
    let enabled = req.enabled.unwrap_or(false);

    let toggle = state
        .categories
        .toggle(&category, enabled)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown category {:?}", category)))?;

    let devices = state.dashboard.list_devices().await;
    if !devices.iter().any(|d| d.ip == ip) {
        return Err(ApiError::not_found("Client not found"));
    }

    // Resolved against the registry record the write lands on, which may be
    // listed under a different identifier than `ip`
    let changes = PolicyChanges {
        category: Some(toggle),
        ..PolicyChanges::default()
    };
    let outcome = state.dashboard.apply(&ip, changes).await?;

    Ok(applied(outcome))
}

async fn toggle_safesearch(
    State(state): State<AppState>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let (ip, enabled) = toggle_params(req)?;
    let changes = PolicyChanges {
        safesearch: Some(enabled),
        ..PolicyChanges::default()
    };
    let outcome = state.dashboard.apply(&ip, changes).await?;

    Ok(applied(outcome))
}

async fn toggle_bedtime(
    State(state): State<AppState>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let (ip, enabled) = toggle_params(req)?;
    let changes = PolicyChanges {
        bedtime: Some(enabled),
        ..PolicyChanges::default()
    };
    let outcome = state.dashboard.apply(&ip, changes).await?;

    Ok(applied(outcome))
}

fn applied(outcome: ApplyOutcome) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "created": outcome.write == RegistryWrite::Created,
        "bedtime_changed": outcome.bedtime_changed,
    }))
}

fn toggle_params(req: ToggleRequest) -> Result<(String, bool), ApiError> {
    let Some(ip) = non_empty(req.ip) else {
        return Err(ApiError::bad_request("Missing IP parameter"));
    };
    let Some(enabled) = req.enabled else {
        return Err(ApiError::bad_request("Missing enabled parameter"));
    };
    Ok((ip, enabled))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_categories;
    use crate::testing::{configured_client, dashboard, FakeLeases, FakeRegistry, FakeRules};

    const LEASES: &str = "1700000000 aa:bb:cc:dd:ee:01 192.168.1.50 kids-tablet *\n";

    fn state(registry: FakeRegistry, rules: FakeRules) -> AppState {
        AppState {
            dashboard: Arc::new(dashboard(FakeLeases::new(LEASES), rules, registry)),
            categories: Arc::new(CategoryTable::new(default_categories())),
        }
    }

    fn body<T>(req: T) -> Result<Json<T>, JsonRejection> {
        Ok(Json(req))
    }

    fn block_request(ip: &str, category: &str, enabled: bool) -> ToggleBlockRequest {
        ToggleBlockRequest {
            ip: Some(ip.to_string()),
            category: Some(category.to_string()),
            enabled: Some(enabled),
        }
    }

    #[tokio::test]
    async fn test_social_media_toggle_round_trip() {
        let registry = FakeRegistry::default();
        let state = state(registry.clone(), FakeRules::default());

        toggle_block(State(state.clone()), body(block_request("192.168.1.50", "social_media", true)))
            .await
            .unwrap();
        assert_eq!(registry.adds()[0].blocked_services.len(), 6);

        let Json(listing) = get_clients(State(state.clone())).await;
        assert!(listing.clients[0].categories["social_media"]);
        assert!(!listing.clients[0].categories["gaming"]);

        toggle_block(State(state.clone()), body(block_request("192.168.1.50", "social_media", false)))
            .await
            .unwrap();
        let Json(listing) = get_clients(State(state)).await;
        assert!(listing.clients[0].device.blocked_services.is_empty());
        assert!(!listing.clients[0].categories["social_media"]);
    }

    #[tokio::test]
    async fn test_partial_block_set_shows_category_on() {
        let mut tablet = configured_client("kids-tablet", &["192.168.1.50"]);
        tablet.blocked_services = ["youtube".to_string(), "tiktok".to_string()].into();
        let state = state(FakeRegistry::default().with_client(tablet), FakeRules::default());

        let Json(listing) = get_clients(State(state)).await;
        assert_eq!(listing.clients.len(), 1);
        assert!(listing.clients[0].categories["social_media"]);
    }

    #[tokio::test]
    async fn test_toggle_block_rejects_bad_input() {
        let state = state(FakeRegistry::default(), FakeRules::default());

        let err = toggle_block(
            State(state.clone()),
            body(ToggleBlockRequest { ip: Some("192.168.1.50".to_string()), category: None, enabled: Some(true) }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = toggle_block(State(state.clone()), body(block_request("10.9.9.9", "gaming", true)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = toggle_block(State(state), body(block_request("192.168.1.50", "crypto", true)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_toggle_bedtime() {
        let rules = FakeRules::default();
        let state = state(FakeRegistry::default(), rules.clone());

        let req = ToggleRequest { ip: Some("192.168.1.50".to_string()), enabled: Some(true) };
        toggle_bedtime(State(state.clone()), body(req)).await.unwrap();
        assert_eq!(rules.rule_count("192.168.1.50"), 1);

        let Json(listing) = get_clients(State(state)).await;
        assert!(listing.clients[0].device.bedtime_enabled);
    }

    #[tokio::test]
    async fn test_toggle_safesearch_requires_ip() {
        let state = state(FakeRegistry::default(), FakeRules::default());

        let req = ToggleRequest { ip: None, enabled: Some(true) };
        let err = toggle_safesearch(State(state), body(req)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_registry_failure_is_server_error() {
        let state = state(FakeRegistry::default().rejecting_writes(), FakeRules::default());

        let req = ToggleRequest { ip: Some("192.168.1.50".to_string()), enabled: Some(true) };
        let err = toggle_safesearch(State(state), body(req)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_hash_tracks_listing() {
        let state = state(FakeRegistry::default(), FakeRules::default());

        let before = get_clients_hash(State(state.clone())).await;
        let req = ToggleRequest { ip: Some("192.168.1.50".to_string()), enabled: Some(true) };
        toggle_bedtime(State(state.clone()), body(req)).await.unwrap();
        let after = get_clients_hash(State(state)).await;

        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_toggle_block_keeps_blocks_of_record_listed_under_mac() {
        let mut laptop = configured_client("laptop", &["aa:bb:cc:dd:ee:01", "192.168.1.50"]);
        laptop.blocked_services = ["youtube".to_string(), "tiktok".to_string()].into();
        let registry = FakeRegistry::default().with_client(laptop);
        let state = state(registry.clone(), FakeRules::default());

        toggle_block(State(state), body(block_request("192.168.1.50", "gaming", true)))
            .await
            .unwrap();

        let (name, record) = &registry.updates()[0];
        assert_eq!(name, "laptop");
        assert!(record.blocked_services.contains("youtube"));
        assert!(record.blocked_services.contains("tiktok"));
        assert!(record.blocked_services.contains("minecraft"));
        assert!(registry.adds().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_bodies_get_json_errors() {
        let app = router(state(FakeRegistry::default(), FakeRules::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let http = reqwest::Client::new();
        let url = format!("http://{}{}", addr, ROUTE_TOGGLE_BEDTIME);

        let resp = http
            .post(&url)
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());

        let resp = http.post(&url).body("ip=192.168.1.50").send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());
    }
}
