pub mod client;
pub mod models;

use anyhow::Result;
use async_trait::async_trait;
use self::models::{ClientsResponse, PolicyClient, StatsResponse};

/// Read/write access to the filtering service's client registry
#[async_trait]
pub trait PolicyRegistry: Send + Sync {
    /// Configured and auto-detected clients
    async fn clients(&self) -> Result<ClientsResponse>;

    /// Replace the configured client currently named `name`
    async fn update_client(&self, name: &str, record: &PolicyClient) -> Result<()>;

    async fn add_client(&self, record: &PolicyClient) -> Result<()>;

    async fn stats(&self) -> Result<StatsResponse>;
}
