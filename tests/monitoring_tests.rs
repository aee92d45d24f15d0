// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// tests/monitoring_tests.rs - Engine-level alerting and persistence

use chrono::Utc;
use openmesh_fleet::monitoring::{
    derive_status, AlertSeverity, AlertType, FleetTarget, HealthCheck, HealthStatus,
    MonitoringEngine, ResourceMetrics,
};
use std::collections::HashSet;
use tempfile::TempDir;

async fn engine(dir: &TempDir) -> MonitoringEngine {
    let engine = MonitoringEngine::new(
        dir.path().join("monitoring.yml"),
        dir.path().join("monitoring_data"),
    )
    .await
    .unwrap();
    engine
        .update_config(|c| c.alert_delivery.console_alerts = false)
        .await
        .unwrap();
    engine
}

fn failed_check(xnode_id: &str) -> HealthCheck {
    let mut check = HealthCheck::new(xnode_id.to_string());
    check.checks.insert("ping".to_string(), false);
    check.checks.insert("ssh".to_string(), false);
    check.status = derive_status(&check.checks);
    check
}

fn sample(xnode_id: &str, cpu: f64) -> ResourceMetrics {
    ResourceMetrics {
        xnode_id: xnode_id.to_string(),
        timestamp: Utc::now(),
        cpu_percent: cpu,
        memory_percent: 20.0,
        disk_percent: 30.0,
        network_in_mbps: 0.0,
        network_out_mbps: 0.0,
        load_average: (0.2, 0.2, 0.2),
    }
}

#[test]
fn test_health_derivation_table() {
    let mut checks = std::collections::HashMap::new();
    checks.insert("ping".to_string(), true);
    checks.insert("ssh".to_string(), true);
    assert_eq!(derive_status(&checks), HealthStatus::Healthy);

    checks.insert("ssh".to_string(), false);
    assert_eq!(derive_status(&checks), HealthStatus::Degraded);

    checks.insert("ping".to_string(), false);
    assert_eq!(derive_status(&checks), HealthStatus::Unhealthy);

    checks.clear();
    assert_eq!(derive_status(&checks), HealthStatus::Unknown);
}

// The edge-1 scenario: both ping and ssh fail, so the same sweep raises
// one SERVICE_DOWN and one SSH_UNREACHABLE critical alert. The two types
// are never deduped against each other.
#[tokio::test]
async fn test_total_failure_raises_two_distinct_critical_alerts() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir).await;

    engine.record_health_check(failed_check("edge-1")).await;

    let alerts = engine.get_active_alerts().await;
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.severity == AlertSeverity::Critical));
    let types: HashSet<AlertType> = alerts.iter().map(|a| a.alert_type).collect();
    assert_eq!(
        types,
        HashSet::from([AlertType::ServiceDown, AlertType::SshUnreachable])
    );
}

#[tokio::test]
async fn test_dedup_allows_one_unresolved_alert_per_pair() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir).await;

    engine.record_metrics(sample("edge-1", 96.0)).await;
    engine.record_metrics(sample("edge-1", 97.0)).await;

    let alerts = engine.get_active_alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::HighCpu);

    // Resolving re-arms the pair
    engine.resolve_alert(&alerts[0].id).await.unwrap();
    engine.record_metrics(sample("edge-1", 98.0)).await;
    assert_eq!(engine.get_active_alerts().await.len(), 1);
}

#[tokio::test]
async fn test_same_type_on_other_xnode_is_not_deduped() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir).await;

    engine.record_metrics(sample("edge-1", 96.0)).await;
    engine.record_metrics(sample("edge-2", 96.0)).await;
    assert_eq!(engine.get_active_alerts().await.len(), 2);
}

#[tokio::test]
async fn test_acknowledged_alert_stays_active_until_resolved() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir).await;

    engine.record_metrics(sample("edge-1", 96.0)).await;
    let alerts = engine.get_active_alerts().await;
    let id = alerts[0].id.clone();

    assert!(engine.acknowledge_alert(&id).await.unwrap());
    let alerts = engine.get_active_alerts().await;
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].acknowledged);

    assert!(engine.resolve_alert(&id).await.unwrap());
    assert!(engine.get_active_alerts().await.is_empty());
    assert!(!engine.resolve_alert("no-such-id").await.unwrap());
}

#[tokio::test]
async fn test_alerts_survive_restart() {
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
        engine.record_health_check(failed_check("edge-1")).await;
        engine.save_history().await.unwrap();
    }

    let reopened = MonitoringEngine::new(config_path, data_dir).await.unwrap();
    assert_eq!(reopened.get_active_alerts().await.len(), 2);

    let report = reopened.get_xnode_status("edge-1").await;
    assert_eq!(
        report.current_health.unwrap().status,
        HealthStatus::Unhealthy
    );
    assert_eq!(report.health_history.len(), 1);
}

#[tokio::test]
async fn test_fleet_sweep_without_addresses_is_all_unknown() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir).await;

    let targets: Vec<FleetTarget> = (0..12)
        .map(|i| FleetTarget {
            xnode_id: format!("edge-{i}"),
            ip_address: None,
            has_webserver: false,
            ssh_key_path: None,
        })
        .collect();

    let checks = engine.check_fleet(&targets).await;
    assert_eq!(checks.len(), 12);
    assert!(checks.iter().all(|c| c.status == HealthStatus::Unknown));
    // An unknown check raises no reachability alerts
    assert!(engine.get_active_alerts().await.is_empty());

    let dashboard = engine.get_dashboard_data().await;
    assert_eq!(dashboard.total_xnodes, 12);
    assert_eq!(dashboard.healthy_xnodes, 0);
}

#[tokio::test]
async fn test_config_set_round_trip() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir).await;

    engine
        .update_config(|c| {
            c.check_interval_seconds = 30;
            c.disk_critical_threshold = 99.0;
        })
        .await
        .unwrap();

    let config = engine.get_config().await;
    assert_eq!(config.check_interval_seconds, 30);
    assert_eq!(config.disk_critical_threshold, 99.0);
    assert_eq!(config.cpu_warning_threshold, 75.0);
    assert_eq!(config.memory_critical_threshold, 95.0);
}
