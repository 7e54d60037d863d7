use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::config::PolicyConfig;
use super::models::{ClientsResponse, PolicyClient, StatsResponse, UpdateRequest};
use super::PolicyRegistry;

const CLIENTS_PATH: &str = "/control/clients";
const CLIENTS_UPDATE_PATH: &str = "/control/clients/update";
const CLIENTS_ADD_PATH: &str = "/control/clients/add";
const STATS_PATH: &str = "/control/stats";

/// HTTP client for the filtering service's control API.
///
/// Every request carries basic auth and the configured timeout. Errors are
/// returned as-is; the dashboard core decides how to degrade.
pub struct AdGuardClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl AdGuardClient {
    pub fn new(config: &PolicyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("revive-dashboardd/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);

        self.http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} rejected", url))?
            .json()
            .await
            .with_context(|| format!("GET {} returned an unexpected body", url))
    }

    /// POST a JSON body. The service answers writes with plain text, so only
    /// the status is checked.
    async fn post(&self, path: &str, body: &impl Serialize) -> Result<()> {
        let url = self.url(path);
        tracing::debug!("POST {}", url);

        self.http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?
            .error_for_status()
            .with_context(|| format!("POST {} rejected", url))?;

        Ok(())
    }
}

#[async_trait]
impl PolicyRegistry for AdGuardClient {
    async fn clients(&self) -> Result<ClientsResponse> {
        self.get(CLIENTS_PATH).await
    }

    async fn update_client(&self, name: &str, record: &PolicyClient) -> Result<()> {
        self.post(CLIENTS_UPDATE_PATH, &UpdateRequest { name, data: record }).await
    }

    async fn add_client(&self, record: &PolicyClient) -> Result<()> {
        self.post(CLIENTS_ADD_PATH, record).await
    }

    async fn stats(&self) -> Result<StatsResponse> {
        self.get(STATS_PATH).await
    }
}
