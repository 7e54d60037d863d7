use std::net::IpAddr;
use std::process::Stdio;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use crate::config::FirewallConfig;

/// Forward-drop rules scoped to a single source address (bedtime mode).
///
/// `rule_present` reports `Err` when the state cannot be determined; callers
/// decide how to degrade. `block`/`unblock` check first so a rule is never
/// inserted twice.
#[async_trait]
pub trait FilterRules: Send + Sync {
    async fn rule_present(&self, address: &str) -> Result<bool>;

    async fn insert_rule(&self, address: &str) -> Result<()>;

    async fn delete_rule(&self, address: &str) -> Result<()>;

    /// Install the drop rule. Returns true if a rule was added.
    async fn block(&self, address: &str) -> Result<bool> {
        if self.rule_present(address).await? {
            return Ok(false);
        }
        self.insert_rule(address).await?;
        Ok(true)
    }

    /// Remove the drop rule. Returns true if a rule was removed.
    async fn unblock(&self, address: &str) -> Result<bool> {
        if !self.rule_present(address).await? {
            return Ok(false);
        }
        self.delete_rule(address).await?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleOp {
    Check,
    Insert,
    Delete,
}

impl RuleOp {
    fn flag(self) -> &'static str {
        match self {
            RuleOp::Check => "-C",
            RuleOp::Insert => "-I",
            RuleOp::Delete => "-D",
        }
    }
}

/// `iptables`/`ip6tables` invoked as child processes
pub struct Iptables {
    config: FirewallConfig,
}

impl Iptables {
    pub fn new(config: FirewallConfig) -> Self {
        Self { config }
    }

    /// Binary and argv for one rule operation. Only literal IP addresses are
    /// accepted; the family picks the binary.
    fn command_line(&self, op: RuleOp, address: &str) -> Result<(&str, Vec<String>)> {
        let ip: IpAddr = address
            .parse()
            .map_err(|_| anyhow!("Refusing packet-filter rule for non-IP address {:?}", address))?;

        let binary = match ip {
            IpAddr::V4(_) => self.config.iptables.as_str(),
            IpAddr::V6(_) => self.config.ip6tables.as_str(),
        };

        let args = vec![
            op.flag().to_string(),
            self.config.chain.clone(),
            "-s".to_string(),
            address.to_string(),
            "-j".to_string(),
            "DROP".to_string(),
        ];

        Ok((binary, args))
    }

    /// Run one operation and return its exit code
    async fn run(&self, op: RuleOp, address: &str) -> Result<i32> {
        let (binary, args) = self.command_line(op, address)?;
        tracing::debug!("{} {}", binary, args.join(" "));

        let mut cmd = Command::new(binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let limit = self.config.command_timeout();
        let output = tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| anyhow!("{} timed out after {}s", binary, limit.as_secs()))?
            .with_context(|| format!("Failed to execute {}", binary))?;

        match output.status.code() {
            Some(code) => {
                if code != 0 && op != RuleOp::Check {
                    tracing::warn!(
                        "{} {} exited with {}: {}",
                        binary,
                        op.flag(),
                        code,
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
                Ok(code)
            }
            None => bail!("{} terminated by signal", binary),
        }
    }
}

#[async_trait]
impl FilterRules for Iptables {
    async fn rule_present(&self, address: &str) -> Result<bool> {
        // Rules are only ever installed for literal IPs
        if address.parse::<IpAddr>().is_err() {
            return Ok(false);
        }

        // -C exits 1 when the rule is absent; other codes mean the check failed
        match self.run(RuleOp::Check, address).await? {
            0 => Ok(true),
            1 => Ok(false),
            code => bail!("Rule check for {} failed with exit code {}", address, code),
        }
    }

    async fn insert_rule(&self, address: &str) -> Result<()> {
        match self.run(RuleOp::Insert, address).await? {
            0 => {
                tracing::info!("Installed drop rule for {}", address);
                Ok(())
            }
            code => bail!("Rule insert for {} failed with exit code {}", address, code),
        }
    }

    async fn delete_rule(&self, address: &str) -> Result<()> {
        match self.run(RuleOp::Delete, address).await? {
            0 => {
                tracing::info!("Removed drop rule for {}", address);
                Ok(())
            }
            code => bail!("Rule delete for {} failed with exit code {}", address, code),
        }
    }
}
