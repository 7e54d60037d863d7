//! In-memory stand-ins for the lease file, packet filter and filtering service.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use anyhow::{bail, Result};
use async_trait::async_trait;
use crate::dashboard::Dashboard;
use crate::firewall::FilterRules;
use crate::leases::{LeaseSource, LeaseTable};
use crate::policy::models::{AutoClient, ClientsResponse, PolicyClient, StatsResponse};
use crate::policy::PolicyRegistry;

pub fn dashboard(leases: FakeLeases, rules: FakeRules, registry: FakeRegistry) -> Dashboard {
    Dashboard::new(Arc::new(leases), Arc::new(rules), Arc::new(registry), true)
}

pub struct FakeLeases {
    contents: Option<String>,
}

impl FakeLeases {
    pub fn new(contents: &str) -> Self {
        Self {
            contents: Some(contents.to_string()),
        }
    }

    pub fn empty() -> Self {
        Self::new("")
    }

    pub fn unreadable() -> Self {
        Self { contents: None }
    }
}

#[async_trait]
impl LeaseSource for FakeLeases {
    async fn read(&self) -> Result<LeaseTable> {
        match &self.contents {
            Some(contents) => Ok(LeaseTable::parse(contents)),
            None => bail!("permission denied"),
        }
    }
}

/// Rule table counting installed drop rules per address
#[derive(Clone, Default)]
pub struct FakeRules {
    rules: Arc<Mutex<BTreeMap<String, usize>>>,
    broken_probe: bool,
    broken_mutation: bool,
}

impl FakeRules {
    pub fn with_rule(self, address: &str) -> Self {
        self.rules.lock().unwrap().insert(address.to_string(), 1);
        self
    }

    /// Every check fails
    pub fn broken() -> Self {
        Self {
            broken_probe: true,
            ..Self::default()
        }
    }

    /// Checks work, inserts and deletes fail
    pub fn read_only() -> Self {
        Self {
            broken_mutation: true,
            ..Self::default()
        }
    }

    pub fn rule_count(&self, address: &str) -> usize {
        self.rules.lock().unwrap().get(address).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FilterRules for FakeRules {
    async fn rule_present(&self, address: &str) -> Result<bool> {
        if self.broken_probe {
            bail!("iptables: exit status 4");
        }
        Ok(self.rule_count(address) > 0)
    }

    async fn insert_rule(&self, address: &str) -> Result<()> {
        if self.broken_mutation {
            bail!("iptables: exit status 4");
        }
        *self.rules.lock().unwrap().entry(address.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn delete_rule(&self, address: &str) -> Result<()> {
        if self.broken_mutation {
            bail!("iptables: exit status 4");
        }
        let mut rules = self.rules.lock().unwrap();
        if let Some(count) = rules.get_mut(address) {
            *count -= 1;
            if *count == 0 {
                rules.remove(address);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct RegistryState {
    clients: ClientsResponse,
    stats: StatsResponse,
    adds: Vec<PolicyClient>,
    updates: Vec<(String, PolicyClient)>,
}

/// Client registry that applies adds and updates to its own listing
#[derive(Clone, Default)]
pub struct FakeRegistry {
    state: Arc<Mutex<RegistryState>>,
    unreachable: bool,
    rejects_writes: bool,
}

impl FakeRegistry {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn rejecting_writes(self) -> Self {
        Self {
            rejects_writes: true,
            ..self
        }
    }

    pub fn with_client(self, client: PolicyClient) -> Self {
        self.state.lock().unwrap().clients.clients.push(client);
        self
    }

    pub fn with_auto_client(self, ip: &str, name: &str) -> Self {
        self.state.lock().unwrap().clients.auto_clients.push(AutoClient {
            ip: ip.to_string(),
            name: name.to_string(),
            source: "ARP".to_string(),
        });
        self
    }

    pub fn with_stats(self, stats: StatsResponse) -> Self {
        self.state.lock().unwrap().stats = stats;
        self
    }

    pub fn adds(&self) -> Vec<PolicyClient> {
        self.state.lock().unwrap().adds.clone()
    }

    pub fn updates(&self) -> Vec<(String, PolicyClient)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn configured(&self) -> Vec<PolicyClient> {
        self.state.lock().unwrap().clients.clients.clone()
    }
}

#[async_trait]
impl PolicyRegistry for FakeRegistry {
    async fn clients(&self) -> Result<ClientsResponse> {
        if self.unreachable {
            bail!("connection refused");
        }
        Ok(self.state.lock().unwrap().clients.clone())
    }

    async fn update_client(&self, name: &str, record: &PolicyClient) -> Result<()> {
        if self.unreachable || self.rejects_writes {
            bail!("400 Bad Request");
        }
        let mut state = self.state.lock().unwrap();
        let Some(slot) = state.clients.clients.iter_mut().find(|c| c.name == name) else {
            bail!("client not found");
        };
        *slot = record.clone();
        state.updates.push((name.to_string(), record.clone()));
        Ok(())
    }

    async fn add_client(&self, record: &PolicyClient) -> Result<()> {
        if self.unreachable || self.rejects_writes {
            bail!("400 Bad Request");
        }
        let mut state = self.state.lock().unwrap();
        state.clients.clients.push(record.clone());
        state.adds.push(record.clone());
        Ok(())
    }

    async fn stats(&self) -> Result<StatsResponse> {
        if self.unreachable {
            bail!("connection refused");
        }
        Ok(self.state.lock().unwrap().stats.clone())
    }
}

/// Configured client record as the filtering service would return it
pub fn configured_client(name: &str, ids: &[&str]) -> PolicyClient {
    PolicyClient {
        name: name.to_string(),
        ids: ids.iter().map(|s| s.to_string()).collect(),
        use_global_settings: false,
        filtering_enabled: true,
        parental_enabled: false,
        safebrowsing_enabled: true,
        safesearch_enabled: false,
        blocked_services: Default::default(),
        extra: Default::default(),
    }
}
