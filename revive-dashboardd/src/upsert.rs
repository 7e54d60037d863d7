use std::collections::BTreeSet;
use std::net::IpAddr;
use thiserror::Error;
use crate::categories::CategoryToggle;
use crate::dashboard::Dashboard;
use crate::policy::models::PolicyClient;

/// Requested policy changes for one address. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyChanges {
    /// Replacement blocked set
    pub blocked_services: Option<BTreeSet<String>>,
    /// Category switched on or off, applied after `blocked_services`
    pub category: Option<CategoryToggle>,
    pub safesearch: Option<bool>,
    pub bedtime: Option<bool>,
}

impl PolicyChanges {
    pub fn is_empty(&self) -> bool {
        self.blocked_services.is_none()
            && self.category.is_none()
            && self.safesearch.is_none()
            && self.bedtime.is_none()
    }

    /// Blocked set to write given the record's `current` set, or `None`
    /// when neither a replacement nor a category toggle was requested
    fn blocked_after(&self, current: &BTreeSet<String>) -> Option<BTreeSet<String>> {
        if self.blocked_services.is_none() && self.category.is_none() {
            return None;
        }

        let base = self.blocked_services.as_ref().unwrap_or(current);
        Some(match &self.category {
            Some(toggle) => toggle.apply_to(base),
            None => base.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryWrite {
    Updated,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub write: RegistryWrite,
    /// Whether a drop rule was installed or removed
    pub bedtime_changed: bool,
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Packet filter state for {address} unavailable")]
    FilterUnavailable {
        address: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Client registry unavailable")]
    RegistryUnavailable(#[source] anyhow::Error),

    #[error("Client registry rejected the write for {address}")]
    RegistryWrite {
        address: String,
        #[source]
        source: anyhow::Error,
    },

    /// The registry record was written but the drop rule was not changed
    #[error("Policy saved for {address} but bedtime rule was not applied")]
    PartialApply {
        address: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Dashboard {
    /// Create or update the registry record for `address` and bring the
    /// bedtime rule in line with `changes`.
    ///
    /// The filter state is read first, the record is written next, and the
    /// rule is changed only after the write succeeds. A rule failure after a
    /// successful write is reported as `PartialApply`; the record is not
    /// reverted.
    pub async fn apply(
        &self,
        address: &str,
        changes: PolicyChanges,
    ) -> Result<ApplyOutcome, ApplyError> {
        if address.is_empty() {
            return Err(ApplyError::InvalidRequest("missing address".to_string()));
        }
        if changes.is_empty() {
            return Err(ApplyError::InvalidRequest("no changes requested".to_string()));
        }

        let bedtime_target = match changes.bedtime {
            Some(wanted) => self.plan_bedtime(address, wanted).await?,
            None => None,
        };

        let registry = self
            .registry
            .clients()
            .await
            .map_err(ApplyError::RegistryUnavailable)?;

        let write = match registry.find_configured(address) {
            Some(existing) => {
                let mut record = existing.clone();
                if let Some(blocked) = changes.blocked_after(&existing.blocked_services) {
                    record.blocked_services = blocked;
                }
                if let Some(safesearch) = changes.safesearch {
                    record.safesearch_enabled = safesearch;
                }
                // Bedtime lives in the packet filter, filtering stays on
                record.filtering_enabled = true;

                self.registry
                    .update_client(&existing.name, &record)
                    .await
                    .map_err(|source| ApplyError::RegistryWrite {
                        address: address.to_string(),
                        source,
                    })?;
                tracing::info!("Updated client {:?} for {}", existing.name, address);
                RegistryWrite::Updated
            }
            None => {
                let record = self.new_record(address, &changes).await;
                self.registry
                    .add_client(&record)
                    .await
                    .map_err(|source| ApplyError::RegistryWrite {
                        address: address.to_string(),
                        source,
                    })?;
                tracing::info!("Created client {:?} for {}", record.name, address);
                RegistryWrite::Created
            }
        };

        let bedtime_changed = match bedtime_target {
            Some(true) => self.rules.block(address).await,
            Some(false) => self.rules.unblock(address).await,
            None => Ok(false),
        }
        .map_err(|source| ApplyError::PartialApply {
            address: address.to_string(),
            source,
        })?;

        Ok(ApplyOutcome {
            write,
            bedtime_changed,
        })
    }

    /// The rule state to switch to, or `None` when it already matches.
    /// Refuses to guess when the current state can't be read.
    async fn plan_bedtime(&self, address: &str, wanted: bool) -> Result<Option<bool>, ApplyError> {
        if address.parse::<IpAddr>().is_err() {
            return Err(ApplyError::InvalidRequest(format!(
                "bedtime needs an IP address, got {:?}",
                address
            )));
        }

        let present = self
            .rules
            .rule_present(address)
            .await
            .map_err(|source| ApplyError::FilterUnavailable {
                address: address.to_string(),
                source,
            })?;

        Ok((present != wanted).then_some(wanted))
    }

    /// Fresh registry record for an address the registry doesn't know
    async fn new_record(&self, address: &str, changes: &PolicyChanges) -> PolicyClient {
        let name = self
            .read_leases()
            .await
            .get(address)
            .map(|lease| lease.hostname.clone())
            .unwrap_or_else(|| format!("Device-{}", address));

        PolicyClient {
            name,
            ids: vec![address.to_string()],
            use_global_settings: false,
            filtering_enabled: true,
            parental_enabled: false,
            safebrowsing_enabled: true,
            safesearch_enabled: changes.safesearch.unwrap_or(false),
            blocked_services: changes.blocked_after(&BTreeSet::new()).unwrap_or_default(),
            extra: Default::default(),
        }
    }
}
