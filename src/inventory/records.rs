// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/inventory/records.rs - Fleet record types and cost derivations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XNodeStatus {
    Deploying,
    Running,
    Stopped,
    Error,
}

impl fmt::Display for XNodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            XNodeStatus::Deploying => "deploying",
            XNodeStatus::Running => "running",
            XNodeStatus::Stopped => "stopped",
            XNodeStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for XNodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deploying" => Ok(XNodeStatus::Deploying),
            "running" => Ok(XNodeStatus::Running),
            "stopped" => Ok(XNodeStatus::Stopped),
            "error" => Ok(XNodeStatus::Error),
            other => Err(format!("unknown xnode status: {other}")),
        }
    }
}

/// The machine handed to the inventory after a deploy completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XNode {
    pub id: String,
    pub name: String,
    pub status: XNodeStatus,
    pub ip_address: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub region: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl XNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        status: XNodeStatus,
        ip_address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            ip_address: ip_address.into(),
            ssh_port: 22,
            created_at: Utc::now(),
            region: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn is_running(&self) -> bool {
        self.status == XNodeStatus::Running
    }
}

/// A tracked xnode as stored in the inventory file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub template: String,
    pub status: XNodeStatus,
    pub ip_address: String,
    pub ssh_port: u16,
    pub region: Option<String>,
    pub deployed_at: DateTime<Utc>,
    pub cost_hourly: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One lifecycle of one xnode. Open while the machine exists; closed with
/// uptime and total cost when it is removed. At most one active record per
/// xnode id exists at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub xnode_id: String,
    pub provider: String,
    pub template: String,
    pub deployed_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub total_cost: f64,
    pub uptime_hours: f64,
    pub region: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DeploymentRecord {
    pub fn open(
        xnode_id: String,
        provider: String,
        template: String,
        deployed_at: DateTime<Utc>,
        region: Option<String>,
        name: Option<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            xnode_id,
            provider,
            template,
            deployed_at,
            terminated_at: None,
            total_cost: 0.0,
            uptime_hours: 0.0,
            region,
            name,
            tags,
        }
    }

    /// Hours from deployment to termination, or to now while still active.
    pub fn calculate_uptime(&self) -> f64 {
        let end = self.terminated_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.deployed_at).num_seconds() as f64 / 3600.0
    }

    pub fn is_active(&self) -> bool {
        self.terminated_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryMetadata {
    pub total_deployed: usize,
    pub total_running: usize,
    pub total_lifetime_cost: f64,
}

impl Default for InventoryMetadata {
    fn default() -> Self {
        Self {
            total_deployed: 0,
            total_running: 0,
            total_lifetime_cost: 0.0,
        }
    }
}

/// Spend projection over the currently running fleet. Monthly is a flat
/// 30-day month, annual a flat 365-day year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReport {
    pub total_hourly: f64,
    pub total_daily: f64,
    pub total_monthly: f64,
    pub projected_annual: f64,
    pub by_provider: HashMap<String, f64>,
    pub by_region: HashMap<String, f64>,
    pub active_count: usize,
    pub total_count: usize,
}

impl CostReport {
    pub fn new(
        total_hourly: f64,
        by_provider: HashMap<String, f64>,
        by_region: HashMap<String, f64>,
        active_count: usize,
        total_count: usize,
    ) -> Self {
        Self {
            total_hourly,
            total_daily: total_hourly * 24.0,
            total_monthly: total_hourly * 24.0 * 30.0,
            projected_annual: total_hourly * 24.0 * 365.0,
            by_provider,
            by_region,
            active_count,
            total_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MostExpensiveXNode {
    pub id: String,
    pub name: String,
    pub cost_hourly: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongestRunningXNode {
    pub id: String,
    pub name: String,
    pub uptime_hours: f64,
    pub uptime_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryStatistics {
    pub total_xnodes: usize,
    pub status_distribution: HashMap<String, usize>,
    pub provider_distribution: HashMap<String, usize>,
    pub region_distribution: HashMap<String, usize>,
    pub total_deployments: usize,
    pub active_deployments: usize,
    pub terminated_deployments: usize,
    pub average_uptime_hours: f64,
    pub lifetime_cost: f64,
    pub most_expensive: Vec<MostExpensiveXNode>,
    pub longest_running: Vec<LongestRunningXNode>,
}

/// Partial update applied to one inventory entry. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct XNodeUpdate {
    pub status: Option<XNodeStatus>,
    pub ip_address: Option<String>,
    pub region: Option<String>,
    pub cost_hourly: Option<f64>,
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}
