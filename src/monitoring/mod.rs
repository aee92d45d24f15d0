// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/monitoring/mod.rs - Fleet monitoring engine

pub mod alerts;
pub mod health;
pub mod metrics;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub use alerts::{
    Alert, AlertDeliveryConfig, AlertDispatcher, AlertSeverity, AlertStore, AlertType,
};
pub use health::{derive_status, HealthCheck, HealthChecker, HealthStatus};
pub use metrics::{MetricsCollector, ResourceMetrics};

// 24 hours of samples at 5 minute and 1 minute cadence respectively.
const MAX_HEALTH_HISTORY: usize = 288;
const MAX_METRICS_HISTORY: usize = 1440;

// Upper bound on xnodes probed at once during a fleet sweep.
const FLEET_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub check_interval_seconds: u64,

    pub ping_timeout: u64,
    pub ssh_timeout: u64,
    pub http_timeout: u64,

    pub cpu_warning_threshold: f64,
    pub cpu_critical_threshold: f64,
    pub memory_warning_threshold: f64,
    pub memory_critical_threshold: f64,
    pub disk_warning_threshold: f64,
    pub disk_critical_threshold: f64,

    #[serde(flatten)]
    pub alert_delivery: AlertDeliveryConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 60,
            ping_timeout: 5,
            ssh_timeout: 10,
            http_timeout: 10,
            cpu_warning_threshold: 75.0,
            cpu_critical_threshold: 90.0,
            memory_warning_threshold: 80.0,
            memory_critical_threshold: 95.0,
            disk_warning_threshold: 85.0,
            disk_critical_threshold: 95.0,
            alert_delivery: AlertDeliveryConfig::default(),
        }
    }
}

/// One xnode as seen by a fleet sweep.
#[derive(Debug, Clone)]
pub struct FleetTarget {
    pub xnode_id: String,
    pub ip_address: Option<String>,
    pub has_webserver: bool,
    pub ssh_key_path: Option<String>,
}

/// Snapshot of one xnode for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct XNodeStatusReport {
    pub xnode_id: String,
    pub current_health: Option<HealthCheck>,
    pub current_metrics: Option<ResourceMetrics>,
    pub active_alerts: Vec<Alert>,
    pub health_history: Vec<HealthCheck>,
    pub metrics_history: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub total_xnodes: usize,
    pub healthy_xnodes: usize,
    pub unhealthy_xnodes: usize,
    pub critical_alerts: usize,
    pub warning_alerts: usize,
    pub active_alerts: Vec<Alert>,
    pub recent_checks: HashMap<String, HealthCheck>,
}

struct EngineState {
    health_history: HashMap<String, Vec<HealthCheck>>,
    metrics_history: HashMap<String, Vec<ResourceMetrics>>,
    alert_store: AlertStore,
}

/// Monitoring engine over the whole fleet: probe scheduling, bounded
/// sample histories, threshold alerting and dashboard aggregation.
///
/// History and alert files are replaced atomically (write to a temp
/// sibling, then rename), so an interrupted watch loop never leaves a
/// half-written file behind. Saves are serialized through `save_lock`;
/// a fleet sweep raises alerts concurrently and each one persists, so
/// two unserialized writers would race on the same temp sibling.
pub struct MonitoringEngine {
    config_path: PathBuf,
    data_dir: PathBuf,
    config: RwLock<MonitoringConfig>,
    state: RwLock<EngineState>,
    save_lock: Mutex<()>,
}

impl MonitoringEngine {
    pub async fn new(config_path: PathBuf, data_dir: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&data_dir).await?;

        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            serde_yaml::from_str(&content)?
        } else {
            MonitoringConfig::default()
        };

        let engine = Self {
            config_path,
            data_dir,
            config: RwLock::new(config),
            state: RwLock::new(EngineState {
                health_history: HashMap::new(),
                metrics_history: HashMap::new(),
                alert_store: AlertStore::new(),
            }),
            save_lock: Mutex::new(()),
        };
        engine.load_history().await?;
        Ok(engine)
    }

    pub async fn get_config(&self) -> MonitoringConfig {
        self.config.read().await.clone()
    }

    /// Apply a config mutation and persist it immediately.
    pub async fn update_config<F>(&self, mutate: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut MonitoringConfig),
    {
        let snapshot = {
            let mut config = self.config.write().await;
            mutate(&mut config);
            config.clone()
        };

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_yaml::to_string(&snapshot)?;
        write_atomic(&self.config_path, content.as_bytes()).await?;
        info!("monitoring config updated");
        Ok(())
    }

    async fn load_history(&self) -> anyhow::Result<()> {
        let mut state = self.state.write().await;

        let health_file = self.data_dir.join("health_history.json");
        if health_file.exists() {
            let content = fs::read_to_string(&health_file).await?;
            let data: HashMap<String, Vec<HealthCheck>> = serde_json::from_str(&content)?;
            for (xnode_id, mut checks) in data {
                truncate_oldest(&mut checks, MAX_HEALTH_HISTORY);
                state.health_history.insert(xnode_id, checks);
            }
        }

        let metrics_file = self.data_dir.join("metrics_history.json");
        if metrics_file.exists() {
            let content = fs::read_to_string(&metrics_file).await?;
            let data: HashMap<String, Vec<ResourceMetrics>> = serde_json::from_str(&content)?;
            for (xnode_id, mut samples) in data {
                truncate_oldest(&mut samples, MAX_METRICS_HISTORY);
                state.metrics_history.insert(xnode_id, samples);
            }
        }

        let alerts_file = self.data_dir.join("active_alerts.json");
        if alerts_file.exists() {
            let content = fs::read_to_string(&alerts_file).await?;
            let data: HashMap<String, Alert> = serde_json::from_str(&content)?;
            state.alert_store.load_from_map(data);
        }

        debug!(
            health_tracked = state.health_history.len(),
            metrics_tracked = state.metrics_history.len(),
            alerts = state.alert_store.as_map().len(),
            "monitoring history loaded"
        );
        Ok(())
    }

    pub async fn save_history(&self) -> anyhow::Result<()> {
        let _guard = self.save_lock.lock().await;
        let state = self.state.read().await;

        let content = serde_json::to_string_pretty(&state.health_history)?;
        write_atomic(&self.data_dir.join("health_history.json"), content.as_bytes()).await?;

        let content = serde_json::to_string_pretty(&state.metrics_history)?;
        write_atomic(&self.data_dir.join("metrics_history.json"), content.as_bytes()).await?;

        let content = serde_json::to_string_pretty(state.alert_store.as_map())?;
        write_atomic(&self.data_dir.join("active_alerts.json"), content.as_bytes()).await?;

        Ok(())
    }

    /// Probe one xnode and ingest the result.
    pub async fn check_health(
        &self,
        xnode_id: &str,
        ip_address: Option<&str>,
        has_webserver: bool,
    ) -> HealthCheck {
        let checker = {
            let config = self.config.read().await;
            HealthChecker::new(config.ping_timeout, config.ssh_timeout, config.http_timeout)
        };

        let check = checker
            .check_health(xnode_id.to_string(), ip_address, has_webserver)
            .await;
        self.record_health_check(check.clone()).await;
        check
    }

    /// Ingest a health check: append to the bounded history and raise any
    /// reachability alerts it implies.
    pub async fn record_health_check(&self, check: HealthCheck) {
        {
            let mut state = self.state.write().await;
            let history = state
                .health_history
                .entry(check.xnode_id.clone())
                .or_default();
            history.push(check.clone());
            truncate_oldest(history, MAX_HEALTH_HISTORY);
        }

        if check.status == HealthStatus::Unhealthy {
            let payload = serde_json::to_value(&check).ok();

            if !check.checks.get("ssh").copied().unwrap_or(true) {
                self.create_alert(
                    check.xnode_id.clone(),
                    AlertType::SshUnreachable,
                    AlertSeverity::Critical,
                    format!("SSH unreachable on {}", check.xnode_id),
                    payload.clone(),
                )
                .await;
            }

            if !check.checks.get("ping").copied().unwrap_or(true) {
                self.create_alert(
                    check.xnode_id.clone(),
                    AlertType::ServiceDown,
                    AlertSeverity::Critical,
                    format!("xNode {} is unreachable", check.xnode_id),
                    payload,
                )
                .await;
            }
        }
    }

    /// Collect one metrics sample from an xnode and ingest it. `None`
    /// means no sample this round, never an error.
    pub async fn collect_metrics(
        &self,
        xnode_id: &str,
        ip_address: Option<&str>,
        ssh_key_path: Option<&str>,
    ) -> Option<ResourceMetrics> {
        let collector = {
            let config = self.config.read().await;
            MetricsCollector::new(config.ssh_timeout)
        };

        let sample = collector
            .collect_metrics(xnode_id.to_string(), ip_address, ssh_key_path)
            .await?;
        self.record_metrics(sample.clone()).await;
        Some(sample)
    }

    /// Ingest a metrics sample: append to the bounded history and apply
    /// threshold alerting, critical bound first so a critical crossing is
    /// never downgraded to a warning.
    pub async fn record_metrics(&self, sample: ResourceMetrics) {
        {
            let mut state = self.state.write().await;
            let history = state
                .metrics_history
                .entry(sample.xnode_id.clone())
                .or_default();
            history.push(sample.clone());
            truncate_oldest(history, MAX_METRICS_HISTORY);
        }

        let config = self.config.read().await.clone();
        let payload = serde_json::to_value(&sample).ok();

        let gauges = [
            (
                sample.cpu_percent,
                config.cpu_warning_threshold,
                config.cpu_critical_threshold,
                AlertType::HighCpu,
                "CPU",
            ),
            (
                sample.memory_percent,
                config.memory_warning_threshold,
                config.memory_critical_threshold,
                AlertType::HighMemory,
                "memory",
            ),
            (
                sample.disk_percent,
                config.disk_warning_threshold,
                config.disk_critical_threshold,
                AlertType::LowDisk,
                "disk",
            ),
        ];

        for (value, warning, critical, alert_type, label) in gauges {
            if value >= critical {
                self.create_alert(
                    sample.xnode_id.clone(),
                    alert_type,
                    AlertSeverity::Critical,
                    format!("Critical {label} usage: {value:.1}%"),
                    payload.clone(),
                )
                .await;
            } else if value >= warning {
                self.create_alert(
                    sample.xnode_id.clone(),
                    alert_type,
                    AlertSeverity::Warning,
                    format!("High {label} usage: {value:.1}%"),
                    payload.clone(),
                )
                .await;
            }
        }
    }

    /// Sweep the fleet, probing independent xnodes concurrently with a
    /// bounded number in flight.
    pub async fn check_fleet(&self, targets: &[FleetTarget]) -> Vec<HealthCheck> {
        stream::iter(targets)
            .map(|target| {
                self.check_health(
                    &target.xnode_id,
                    target.ip_address.as_deref(),
                    target.has_webserver,
                )
            })
            .buffer_unordered(FLEET_CONCURRENCY)
            .collect()
            .await
    }

    async fn create_alert(
        &self,
        xnode_id: String,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: String,
        metadata: Option<serde_json::Value>,
    ) {
        let delivery = {
            let mut state = self.state.write().await;
            if state.alert_store.has_unresolved(&xnode_id, alert_type) {
                debug!(xnode_id = %xnode_id, %alert_type, "suppressing duplicate alert");
                return;
            }

            let mut alert = Alert::new(xnode_id, alert_type, severity, message);
            if let Some(metadata) = metadata {
                alert = alert.with_metadata(metadata);
            }
            state.alert_store.add_alert(alert.clone());
            alert
        };

        let config = self.config.read().await.alert_delivery.clone();
        AlertDispatcher::new(config).deliver(&delivery).await;

        if let Err(e) = self.save_history().await {
            warn!(error = %e, "failed to persist alerts after creation");
        }
    }

    pub async fn acknowledge_alert(&self, alert_id: &str) -> anyhow::Result<bool> {
        let changed = self.state.write().await.alert_store.acknowledge_alert(alert_id);
        if changed {
            self.save_history().await?;
        }
        Ok(changed)
    }

    pub async fn resolve_alert(&self, alert_id: &str) -> anyhow::Result<bool> {
        let changed = self.state.write().await.alert_store.resolve_alert(alert_id);
        if changed {
            self.save_history().await?;
        }
        Ok(changed)
    }

    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        self.state
            .read()
            .await
            .alert_store
            .get_active_alerts()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_xnode_status(&self, xnode_id: &str) -> XNodeStatusReport {
        let state = self.state.read().await;

        let health_history: Vec<HealthCheck> = state
            .health_history
            .get(xnode_id)
            .map(|h| h.iter().rev().take(10).rev().cloned().collect())
            .unwrap_or_default();

        let metrics_history: Vec<ResourceMetrics> = state
            .metrics_history
            .get(xnode_id)
            .map(|m| m.iter().rev().take(10).rev().cloned().collect())
            .unwrap_or_default();

        XNodeStatusReport {
            xnode_id: xnode_id.to_string(),
            current_health: health_history.last().cloned(),
            current_metrics: metrics_history.last().cloned(),
            active_alerts: state
                .alert_store
                .get_alerts_for_xnode(xnode_id)
                .into_iter()
                .cloned()
                .collect(),
            health_history,
            metrics_history,
        }
    }

    /// Aggregate over every xnode that has ever produced a sample. An
    /// xnode counts as healthy only when its latest health entry is
    /// `Healthy`; anything else, including never-checked, counts
    /// unhealthy.
    pub async fn get_dashboard_data(&self) -> DashboardData {
        let state = self.state.read().await;

        let all_xnodes: HashSet<&String> = state
            .health_history
            .keys()
            .chain(state.metrics_history.keys())
            .collect();

        let healthy_xnodes = all_xnodes
            .iter()
            .filter(|xid| {
                state
                    .health_history
                    .get(**xid)
                    .and_then(|h| h.last())
                    .map(|h| h.status == HealthStatus::Healthy)
                    .unwrap_or(false)
            })
            .count();

        let active = state.alert_store.get_active_alerts();
        let critical_alerts = active
            .iter()
            .filter(|a| a.severity == AlertSeverity::Critical)
            .count();
        let warning_alerts = active
            .iter()
            .filter(|a| a.severity == AlertSeverity::Warning)
            .count();

        let recent_checks: HashMap<String, HealthCheck> = all_xnodes
            .iter()
            .filter_map(|xid| {
                state
                    .health_history
                    .get(*xid)
                    .and_then(|h| h.last())
                    .map(|h| ((**xid).clone(), h.clone()))
            })
            .collect();

        DashboardData {
            total_xnodes: all_xnodes.len(),
            healthy_xnodes,
            unhealthy_xnodes: all_xnodes.len() - healthy_xnodes,
            critical_alerts,
            warning_alerts,
            active_alerts: state
                .alert_store
                .get_all_alerts()
                .into_iter()
                .cloned()
                .collect(),
            recent_checks,
        }
    }

    /// Sweep, persist, report, sleep, repeat until ctrl-c. State is
    /// persisted once more on the way out.
    pub async fn watch(&self, targets: &[FleetTarget]) -> anyhow::Result<()> {
        let interval = {
            let config = self.config.read().await;
            std::time::Duration::from_secs(config.check_interval_seconds)
        };

        info!(
            targets = targets.len(),
            interval_secs = interval.as_secs(),
            "fleet watch started"
        );

        loop {
            self.check_fleet(targets).await;
            for target in targets {
                self.collect_metrics(
                    &target.xnode_id,
                    target.ip_address.as_deref(),
                    target.ssh_key_path.as_deref(),
                )
                .await;
            }
            self.save_history().await?;

            let dashboard = self.get_dashboard_data().await;
            info!(
                healthy = dashboard.healthy_xnodes,
                unhealthy = dashboard.unhealthy_xnodes,
                critical_alerts = dashboard.critical_alerts,
                warning_alerts = dashboard.warning_alerts,
                "fleet sweep complete"
            );

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("fleet watch stopping");
                    self.save_history().await?;
                    return Ok(());
                }
            }
        }
    }
}

fn truncate_oldest<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        items.drain(..items.len() - max);
    }
}

async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn engine(dir: &TempDir) -> MonitoringEngine {
        let mut config = MonitoringConfig::default();
        config.alert_delivery.console_alerts = false;
        let engine = MonitoringEngine::new(
            dir.path().join("monitoring.yml"),
            dir.path().join("monitoring_data"),
        )
        .await
        .unwrap();
        engine.update_config(|c| *c = config).await.unwrap();
        engine
    }

    fn unhealthy_check(xnode_id: &str) -> HealthCheck {
        let mut check = HealthCheck::new(xnode_id.to_string());
        check.checks.insert("ping".to_string(), false);
        check.checks.insert("ssh".to_string(), false);
        check.status = derive_status(&check.checks);
        check
    }

    fn sample(xnode_id: &str, cpu: f64, memory: f64, disk: f64) -> ResourceMetrics {
        ResourceMetrics {
            xnode_id: xnode_id.to_string(),
            timestamp: Utc::now(),
            cpu_percent: cpu,
            memory_percent: memory,
            disk_percent: disk,
            network_in_mbps: 0.0,
            network_out_mbps: 0.0,
            load_average: (0.1, 0.1, 0.1),
        }
    }

    #[tokio::test]
    async fn test_unhealthy_check_raises_both_reachability_alerts() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        engine.record_health_check(unhealthy_check("x-1")).await;

        let alerts = engine.get_active_alerts().await;
        assert_eq!(alerts.len(), 2);
        let types: HashSet<AlertType> = alerts.iter().map(|a| a.alert_type).collect();
        assert!(types.contains(&AlertType::ServiceDown));
        assert!(types.contains(&AlertType::SshUnreachable));
        assert!(alerts.iter().all(|a| a.severity == AlertSeverity::Critical));
    }

    #[tokio::test]
    async fn test_repeat_unhealthy_checks_do_not_duplicate_alerts() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        engine.record_health_check(unhealthy_check("x-1")).await;
        engine.record_health_check(unhealthy_check("x-1")).await;
        assert_eq!(engine.get_active_alerts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_critical_wins_over_warning() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        engine.record_metrics(sample("x-1", 95.0, 10.0, 10.0)).await;

        let alerts = engine.get_active_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::HighCpu);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn test_unresolved_warning_suppresses_escalation() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        engine.record_metrics(sample("x-1", 80.0, 10.0, 10.0)).await;
        engine.record_metrics(sample("x-1", 95.0, 10.0, 10.0)).await;

        let alerts = engine.get_active_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);

        // After resolving, the next crossing surfaces as critical
        engine.resolve_alert(&alerts[0].id).await.unwrap();
        engine.record_metrics(sample("x-1", 95.0, 10.0, 10.0)).await;
        let alerts = engine.get_active_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn test_healthy_metrics_raise_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        engine.record_metrics(sample("x-1", 10.0, 20.0, 30.0)).await;
        assert!(engine.get_active_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        for _ in 0..(MAX_HEALTH_HISTORY + 20) {
            let mut check = HealthCheck::new("x-1".to_string());
            check.checks.insert("ping".to_string(), true);
            check.status = derive_status(&check.checks);
            engine.record_health_check(check).await;
        }

        let state = engine.state.read().await;
        assert_eq!(state.health_history["x-1"].len(), MAX_HEALTH_HISTORY);
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        let mut healthy = HealthCheck::new("x-1".to_string());
        healthy.checks.insert("ping".to_string(), true);
        healthy.status = derive_status(&healthy.checks);
        engine.record_health_check(healthy).await;
        engine.record_health_check(unhealthy_check("x-2")).await;
        // x-3 only ever produced metrics
        engine.record_metrics(sample("x-3", 10.0, 10.0, 10.0)).await;

        let dashboard = engine.get_dashboard_data().await;
        assert_eq!(dashboard.total_xnodes, 3);
        assert_eq!(dashboard.healthy_xnodes, 1);
        assert_eq!(dashboard.unhealthy_xnodes, 2);
        assert_eq!(dashboard.critical_alerts, 2);
        assert_eq!(dashboard.warning_alerts, 0);
        assert!(!dashboard.recent_checks.contains_key("x-3"));
        assert_eq!(
            dashboard.recent_checks["x-1"].status,
            HealthStatus::Healthy
        );
        assert_eq!(
            dashboard.recent_checks["x-2"].status,
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_concurrent_alert_saves_leave_parseable_files() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("monitoring.yml");
        let data_dir = dir.path().join("monitoring_data");

        {
            let engine = MonitoringEngine::new(config_path.clone(), data_dir.clone())
                .await
                .unwrap();
            engine
                .update_config(|c| c.alert_delivery.console_alerts = false)
                .await
                .unwrap();

            // Each sample crosses the cpu critical threshold, so every
            // ingest raises an alert and persists, all in flight at once.
            let ingests = (0..FLEET_CONCURRENCY * 2)
                .map(|i| engine.record_metrics(sample(&format!("x-{i}"), 96.0, 10.0, 10.0)));
            futures::future::join_all(ingests).await;
        }

        let reopened = MonitoringEngine::new(config_path, data_dir.clone())
            .await
            .unwrap();
        let alerts = reopened.get_active_alerts().await;
        assert_eq!(alerts.len(), FLEET_CONCURRENCY * 2);

        let leftovers: Vec<_> = std::fs::read_dir(&data_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_history_survives_restart() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("monitoring.yml");
        let data_dir = dir.path().join("monitoring_data");

        {
            let engine = MonitoringEngine::new(config_path.clone(), data_dir.clone())
                .await
                .unwrap();
            engine
                .update_config(|c| c.alert_delivery.console_alerts = false)
                .await
                .unwrap();
            engine.record_health_check(unhealthy_check("x-1")).await;
            engine.save_history().await.unwrap();
        }

        let reopened = MonitoringEngine::new(config_path, data_dir).await.unwrap();
        let report = reopened.get_xnode_status("x-1").await;
        assert!(report.current_health.is_some());
        assert_eq!(report.active_alerts.len(), 2);

        // No temp files left behind by atomic writes
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("monitoring_data"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("monitoring.yml");
        let data_dir = dir.path().join("monitoring_data");

        {
            let engine = MonitoringEngine::new(config_path.clone(), data_dir.clone())
                .await
                .unwrap();
            engine
                .update_config(|c| {
                    c.check_interval_seconds = 120;
                    c.cpu_critical_threshold = 99.0;
                })
                .await
                .unwrap();
        }

        let reopened = MonitoringEngine::new(config_path, data_dir).await.unwrap();
        let config = reopened.get_config().await;
        assert_eq!(config.check_interval_seconds, 120);
        assert_eq!(config.cpu_critical_threshold, 99.0);
        // Untouched fields keep their defaults
        assert_eq!(config.ping_timeout, 5);
    }

    #[tokio::test]
    async fn test_check_fleet_covers_every_target() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;

        // Addressless targets complete instantly with Unknown status
        let targets: Vec<FleetTarget> = (0..20)
            .map(|i| FleetTarget {
                xnode_id: format!("x-{i}"),
                ip_address: None,
                has_webserver: false,
                ssh_key_path: None,
            })
            .collect();

        let checks = engine.check_fleet(&targets).await;
        assert_eq!(checks.len(), 20);
        assert!(checks.iter().all(|c| c.status == HealthStatus::Unknown));

        let ids: HashSet<String> = checks.iter().map(|c| c.xnode_id.clone()).collect();
        assert_eq!(ids.len(), 20);
    }
}
