// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/inventory/mod.rs - Persisted fleet store with cost accounting

pub mod csv;
pub mod records;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use records::{
    CostReport, DeploymentRecord, InventoryEntry, InventoryMetadata, InventoryStatistics,
    LongestRunningXNode, MostExpensiveXNode, XNode, XNodeStatus, XNodeUpdate,
};

const INVENTORY_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("xnode '{0}' already exists in inventory")]
    DuplicateId(String),

    #[error("xnode '{0}' not found in inventory")]
    NotFound(String),

    #[error("inventory I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("inventory serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type InventoryResult<T> = Result<T, InventoryError>;

#[derive(Debug, Serialize, Deserialize)]
struct InventoryData {
    version: String,
    last_updated: DateTime<Utc>,
    xnodes: HashMap<String, InventoryEntry>,
    history: Vec<DeploymentRecord>,
    metadata: InventoryMetadata,
}

/// JSON-file-backed fleet inventory. Every mutation persists before it
/// returns. Single writer assumed; the save path copies the previous file
/// to a `.backup` sibling and then rewrites in place, so a crash mid-write
/// loses at most the current mutation.
pub struct Inventory {
    path: PathBuf,
    xnodes: HashMap<String, InventoryEntry>,
    history: Vec<DeploymentRecord>,
    metadata: InventoryMetadata,
}

impl Inventory {
    pub fn open(path: impl AsRef<Path>) -> InventoryResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut inventory = Self {
            path,
            xnodes: HashMap::new(),
            history: Vec::new(),
            metadata: InventoryMetadata::default(),
        };
        inventory.load()?;
        Ok(inventory)
    }

    fn load(&mut self) -> InventoryResult<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)?;
        let data: InventoryData = serde_json::from_str(&contents)?;
        self.xnodes = data.xnodes;
        self.history = data.history;
        self.metadata = data.metadata;
        debug!(
            xnodes = self.xnodes.len(),
            history = self.history.len(),
            "inventory loaded"
        );
        Ok(())
    }

    fn save(&self) -> InventoryResult<()> {
        if self.path.exists() {
            let backup = self.path.with_extension("json.backup");
            if let Err(e) = fs::copy(&self.path, &backup) {
                warn!(error = %e, "inventory backup failed, continuing with save");
            }
        }

        let data = InventoryData {
            version: INVENTORY_VERSION.to_string(),
            last_updated: Utc::now(),
            xnodes: self.xnodes.clone(),
            history: self.history.clone(),
            metadata: self.metadata.clone(),
        };
        let json = serde_json::to_string_pretty(&data)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn add_xnode(
        &mut self,
        xnode: &XNode,
        provider: String,
        template: String,
        cost_hourly: f64,
        tags: Vec<String>,
    ) -> InventoryResult<()> {
        if self.xnodes.contains_key(&xnode.id) {
            return Err(InventoryError::DuplicateId(xnode.id.clone()));
        }

        let entry = InventoryEntry {
            id: xnode.id.clone(),
            name: xnode.name.clone(),
            provider: provider.clone(),
            template: template.clone(),
            status: xnode.status,
            ip_address: xnode.ip_address.clone(),
            ssh_port: xnode.ssh_port,
            region: xnode.region.clone(),
            deployed_at: xnode.created_at,
            cost_hourly,
            tags: tags.clone(),
            metadata: xnode.metadata.clone(),
        };
        self.xnodes.insert(xnode.id.clone(), entry);

        self.history.push(DeploymentRecord::open(
            xnode.id.clone(),
            provider,
            template,
            xnode.created_at,
            xnode.region.clone(),
            Some(xnode.name.clone()),
            tags,
        ));

        self.metadata.total_deployed += 1;
        if xnode.status == XNodeStatus::Running {
            self.metadata.total_running += 1;
        }

        self.save()?;
        info!(xnode_id = %xnode.id, "xnode added to inventory");
        Ok(())
    }

    /// Remove an xnode, closing its active deployment record. Uptime and
    /// final cost are folded into the lifetime total at this point.
    pub fn remove_xnode(&mut self, xnode_id: &str) -> InventoryResult<()> {
        let entry = self
            .xnodes
            .get(xnode_id)
            .ok_or_else(|| InventoryError::NotFound(xnode_id.to_string()))?
            .clone();

        for record in &mut self.history {
            if record.xnode_id == xnode_id && record.is_active() {
                record.terminated_at = Some(Utc::now());
                record.uptime_hours = record.calculate_uptime();
                record.total_cost = record.uptime_hours * entry.cost_hourly;
                self.metadata.total_lifetime_cost += record.total_cost;
                break;
            }
        }

        if entry.status == XNodeStatus::Running {
            self.metadata.total_running = self.metadata.total_running.saturating_sub(1);
        }

        self.xnodes.remove(xnode_id);
        self.save()?;
        info!(xnode_id, "xnode removed from inventory");
        Ok(())
    }

    pub fn update_xnode(&mut self, xnode_id: &str, updates: XNodeUpdate) -> InventoryResult<()> {
        let entry = self
            .xnodes
            .get_mut(xnode_id)
            .ok_or_else(|| InventoryError::NotFound(xnode_id.to_string()))?;

        if let Some(status) = updates.status {
            let old_status = entry.status;
            entry.status = status;
            if old_status != status {
                if old_status == XNodeStatus::Running {
                    self.metadata.total_running = self.metadata.total_running.saturating_sub(1);
                }
                if status == XNodeStatus::Running {
                    self.metadata.total_running += 1;
                }
            }
        }
        if let Some(ip_address) = updates.ip_address {
            entry.ip_address = ip_address;
        }
        if let Some(region) = updates.region {
            entry.region = Some(region);
        }
        if let Some(cost_hourly) = updates.cost_hourly {
            entry.cost_hourly = cost_hourly;
        }
        if let Some(name) = updates.name {
            entry.name = name;
        }
        if let Some(tags) = updates.tags {
            entry.tags = tags;
        }

        self.save()?;
        Ok(())
    }

    pub fn get_xnode(&self, xnode_id: &str) -> Option<&InventoryEntry> {
        self.xnodes.get(xnode_id)
    }

    pub fn list_all(&self) -> Vec<&InventoryEntry> {
        self.xnodes.values().collect()
    }

    pub fn list_by_provider(&self, provider: &str) -> Vec<&InventoryEntry> {
        self.xnodes
            .values()
            .filter(|x| x.provider == provider)
            .collect()
    }

    pub fn list_by_status(&self, status: XNodeStatus) -> Vec<&InventoryEntry> {
        self.xnodes.values().filter(|x| x.status == status).collect()
    }

    /// Tag filter. `match_all` requires every queried tag; the default
    /// any-match keeps entries sharing at least one.
    pub fn list_by_tags(&self, tags: &[String], match_all: bool) -> Vec<&InventoryEntry> {
        self.xnodes
            .values()
            .filter(|x| {
                let entry_tags: HashSet<&String> = x.tags.iter().collect();
                let query_tags: HashSet<&String> = tags.iter().collect();
                if match_all {
                    query_tags.is_subset(&entry_tags)
                } else {
                    !entry_tags.is_disjoint(&query_tags)
                }
            })
            .collect()
    }

    pub fn search(&self, query: &str) -> Vec<&InventoryEntry> {
        let query = query.to_lowercase();
        self.xnodes
            .values()
            .filter(|x| {
                x.name.to_lowercase().contains(&query) || x.id.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Current spend over running entries, projected to daily, monthly
    /// (30 days) and annual (365 days) horizons.
    pub fn get_total_cost(&self) -> HashMap<String, f64> {
        let hourly: f64 = self
            .xnodes
            .values()
            .filter(|x| x.status == XNodeStatus::Running)
            .map(|x| x.cost_hourly)
            .sum();

        HashMap::from([
            ("hourly".to_string(), hourly),
            ("daily".to_string(), hourly * 24.0),
            ("monthly".to_string(), hourly * 24.0 * 30.0),
            ("annual".to_string(), hourly * 24.0 * 365.0),
        ])
    }

    pub fn get_cost_report(&self) -> CostReport {
        let mut by_provider: HashMap<String, f64> = HashMap::new();
        let mut by_region: HashMap<String, f64> = HashMap::new();
        let mut total_hourly = 0.0;
        let mut active_count = 0;

        for xnode in self.xnodes.values() {
            if xnode.status != XNodeStatus::Running {
                continue;
            }
            total_hourly += xnode.cost_hourly;
            *by_provider.entry(xnode.provider.clone()).or_insert(0.0) += xnode.cost_hourly;
            let region = xnode.region.clone().unwrap_or_else(|| "unknown".to_string());
            *by_region.entry(region).or_insert(0.0) += xnode.cost_hourly;
            active_count += 1;
        }

        CostReport::new(
            total_hourly,
            by_provider,
            by_region,
            active_count,
            self.xnodes.len(),
        )
    }

    pub fn get_statistics(&self) -> InventoryStatistics {
        let mut status_distribution: HashMap<String, usize> = HashMap::new();
        let mut provider_distribution: HashMap<String, usize> = HashMap::new();
        let mut region_distribution: HashMap<String, usize> = HashMap::new();

        for xnode in self.xnodes.values() {
            *status_distribution
                .entry(xnode.status.to_string())
                .or_insert(0) += 1;
            *provider_distribution
                .entry(xnode.provider.clone())
                .or_insert(0) += 1;
            let region = xnode.region.clone().unwrap_or_else(|| "unknown".to_string());
            *region_distribution.entry(region).or_insert(0) += 1;
        }

        let (active, terminated): (Vec<_>, Vec<_>) =
            self.history.iter().partition(|r| r.is_active());

        let average_uptime_hours = if terminated.is_empty() {
            0.0
        } else {
            terminated.iter().map(|r| r.uptime_hours).sum::<f64>() / terminated.len() as f64
        };

        let mut by_cost: Vec<&InventoryEntry> = self.xnodes.values().collect();
        by_cost.sort_by(|a, b| {
            b.cost_hourly
                .partial_cmp(&a.cost_hourly)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let most_expensive = by_cost
            .iter()
            .take(5)
            .map(|x| MostExpensiveXNode {
                id: x.id.clone(),
                name: x.name.clone(),
                cost_hourly: x.cost_hourly,
            })
            .collect();

        let mut longest_running: Vec<LongestRunningXNode> = active
            .iter()
            .map(|r| {
                let uptime = r.calculate_uptime();
                LongestRunningXNode {
                    id: r.xnode_id.clone(),
                    name: r.name.clone().unwrap_or_default(),
                    uptime_hours: uptime,
                    uptime_days: uptime / 24.0,
                }
            })
            .collect();
        longest_running.sort_by(|a, b| {
            b.uptime_hours
                .partial_cmp(&a.uptime_hours)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        longest_running.truncate(5);

        InventoryStatistics {
            total_xnodes: self.xnodes.len(),
            status_distribution,
            provider_distribution,
            region_distribution,
            total_deployments: self.history.len(),
            active_deployments: active.len(),
            terminated_deployments: terminated.len(),
            average_uptime_hours,
            lifetime_cost: self.metadata.total_lifetime_cost,
            most_expensive,
            longest_running,
        }
    }

    /// Deployment history, newest first, optionally filtered by xnode and
    /// provider.
    pub fn get_deployment_history(
        &self,
        xnode_id: Option<&str>,
        provider: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<&DeploymentRecord> {
        let mut records: Vec<&DeploymentRecord> = self
            .history
            .iter()
            .filter(|r| xnode_id.map_or(true, |id| r.xnode_id == id))
            .filter(|r| provider.map_or(true, |p| r.provider == p))
            .collect();

        records.sort_by(|a, b| b.deployed_at.cmp(&a.deployed_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        records
    }

    /// Drop terminated records older than the cutoff. Active records are
    /// always kept.
    pub fn cleanup_old_history(&mut self, days: u64) -> InventoryResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        let before = self.history.len();

        self.history
            .retain(|r| r.is_active() || r.terminated_at.map(|t| t > cutoff).unwrap_or(false));

        let removed = before - self.history.len();
        if removed > 0 {
            self.save()?;
            info!(removed, "old deployment history pruned");
        }
        Ok(removed)
    }

    pub fn metadata(&self) -> &InventoryMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.xnodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xnodes.is_empty()
    }
}
