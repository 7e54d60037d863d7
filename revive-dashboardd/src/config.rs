use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub policy: PolicyConfig,
    #[serde(default)]
    pub leases: LeaseConfig,
    #[serde(default)]
    pub firewall: FirewallConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Category name -> service ids. Replaces the built-in table when present.
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, BTreeSet<String>>,
}

/// Filtering service endpoint and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_policy_url")]
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_policy_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaseConfig {
    #[serde(default = "default_lease_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirewallConfig {
    #[serde(default = "default_iptables")]
    pub iptables: String,
    #[serde(default = "default_ip6tables")]
    pub ip6tables: String,
    #[serde(default = "default_chain")]
    pub chain: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Bedtime state reported when the rule check itself fails
    #[serde(default = "default_assume_blocked")]
    pub assume_blocked_on_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_policy_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_policy_timeout() -> u64 {
    5
}

fn default_lease_path() -> PathBuf {
    PathBuf::from("/var/lib/misc/dnsmasq.leases")
}

fn default_iptables() -> String {
    "iptables".to_string()
}

fn default_ip6tables() -> String {
    "ip6tables".to_string()
}

fn default_chain() -> String {
    "FORWARD".to_string()
}

fn default_command_timeout() -> u64 {
    5
}

fn default_assume_blocked() -> bool {
    true
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

pub fn default_categories() -> BTreeMap<String, BTreeSet<String>> {
    let table: [(&str, &[&str]); 4] = [
        ("social_media", &["youtube", "tiktok", "instagram", "facebook", "snapchat", "twitter"]),
        ("gaming", &["roblox", "fortnite", "minecraft", "twitch"]),
        ("adult_content", &["adult", "porn"]),
        ("all", &[]),
    ];

    table
        .iter()
        .map(|(name, services)| {
            (name.to_string(), services.iter().map(|s| s.to_string()).collect())
        })
        .collect()
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            path: default_lease_path(),
        }
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            iptables: default_iptables(),
            ip6tables: default_ip6tables(),
            chain: default_chain(),
            command_timeout_secs: default_command_timeout(),
            assume_blocked_on_error: default_assume_blocked(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl PolicyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FirewallConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }
}
