use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::types::LeaseRecord;

/// Lease records keyed by address, in lease-file order.
#[derive(Debug, Clone, Default)]
pub struct LeaseTable {
    records: Vec<LeaseRecord>,
    index: HashMap<String, usize>,
}

impl LeaseTable {
    /// Parse dnsmasq lease lines: `expiry mac ip hostname [client-id]`.
    /// Lines with fewer than four fields are skipped. A repeated ip replaces
    /// the earlier record in place.
    pub fn parse(contents: &str) -> Self {
        let mut table = Self::default();

        for line in contents.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                continue;
            }

            let mac = fields[1].to_string();
            let hostname = if fields[3] == "*" {
                synthesized_name(&mac)
            } else {
                fields[3].to_string()
            };

            table.insert(LeaseRecord {
                ip: fields[2].to_string(),
                hostname,
                expires: parse_expiry(fields[0]),
                mac,
            });
        }

        table
    }

    fn insert(&mut self, record: LeaseRecord) {
        match self.index.get(&record.ip) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.index.insert(record.ip.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, ip: &str) -> Option<&LeaseRecord> {
        self.index.get(ip).map(|&pos| &self.records[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &LeaseRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// `Device-` plus the trailing five characters of the mac
fn synthesized_name(mac: &str) -> String {
    let start = mac
        .char_indices()
        .rev()
        .nth(4)
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("Device-{}", &mac[start..])
}

fn parse_expiry(field: &str) -> Option<DateTime<Utc>> {
    match field.parse::<i64>() {
        Ok(0) | Err(_) => None,
        Ok(secs) => DateTime::from_timestamp(secs, 0),
    }
}

/// Source of DHCP lease data
#[async_trait]
pub trait LeaseSource: Send + Sync {
    async fn read(&self) -> Result<LeaseTable>;
}

/// Reads the dnsmasq lease file from disk on every call
pub struct LeaseFile {
    path: PathBuf,
}

impl LeaseFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LeaseSource for LeaseFile {
    async fn read(&self) -> Result<LeaseTable> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Lease file {} not present", self.path.display());
                return Ok(LeaseTable::default());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read lease file: {}", self.path.display())
                });
            }
        };

        Ok(LeaseTable::parse(&contents))
    }
}
