use std::sync::Arc;
use shared::types::DashboardStats;
use crate::firewall::FilterRules;
use crate::leases::{LeaseSource, LeaseTable};
use crate::policy::PolicyRegistry;

/// The three external sources behind the dashboard.
///
/// Holds no device state of its own; every call reads the sources again.
/// Concurrent calls are not serialized, so two writes to the same client
/// race at the registry and the last one wins.
pub struct Dashboard {
    pub(crate) leases: Arc<dyn LeaseSource>,
    pub(crate) rules: Arc<dyn FilterRules>,
    pub(crate) registry: Arc<dyn PolicyRegistry>,
    /// Bedtime state reported when the rule check fails
    pub(crate) assume_blocked_on_error: bool,
}

impl Dashboard {
    pub fn new(
        leases: Arc<dyn LeaseSource>,
        rules: Arc<dyn FilterRules>,
        registry: Arc<dyn PolicyRegistry>,
        assume_blocked_on_error: bool,
    ) -> Self {
        Self {
            leases,
            rules,
            registry,
            assume_blocked_on_error,
        }
    }

    /// Lease table, or an empty one if the file can't be read
    pub(crate) async fn read_leases(&self) -> LeaseTable {
        match self.leases.read().await {
            Ok(table) => {
                if table.is_empty() {
                    tracing::debug!("Lease table is empty");
                }
                table
            }
            Err(e) => {
                tracing::warn!("Lease table unavailable: {:#}", e);
                LeaseTable::default()
            }
        }
    }

    /// Live bedtime state for one address
    pub(crate) async fn bedtime_state(&self, address: &str) -> bool {
        match self.rules.rule_present(address).await {
            Ok(present) => present,
            Err(e) => {
                tracing::warn!(
                    "Bedtime state for {} unknown, reporting {}: {:#}",
                    address,
                    self.assume_blocked_on_error,
                    e
                );
                self.assume_blocked_on_error
            }
        }
    }

    /// Aggregate counters, zeros when the filtering service is unreachable
    pub async fn stats(&self) -> DashboardStats {
        match self.registry.stats().await {
            Ok(stats) => DashboardStats {
                ads_blocked_today: stats.num_blocked_filtering,
                dns_queries_today: stats.num_dns_queries,
                avg_processing_time: stats.avg_processing_time,
            },
            Err(e) => {
                tracing::warn!("Stats unavailable: {:#}", e);
                DashboardStats::default()
            }
        }
    }
}
