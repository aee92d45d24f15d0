// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// tests/inventory_tests.rs - Fleet store lifecycle and cost accounting

use chrono::{Duration, Utc};
use openmesh_fleet::inventory::{Inventory, InventoryError, XNode, XNodeStatus, XNodeUpdate};
use tempfile::TempDir;

fn add(inventory: &mut Inventory, id: &str, name: &str, cost_hourly: f64) {
    let xnode = XNode::new(id, name, XNodeStatus::Running, "203.0.113.10").with_region("nyc1");
    inventory
        .add_xnode(
            &xnode,
            "digitalocean".to_string(),
            "do-basic-2".to_string(),
            cost_hourly,
            vec!["edge".to_string()],
        )
        .unwrap();
}

#[test]
fn test_add_then_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut inventory = Inventory::open(dir.path().join("inventory.json")).unwrap();
    add(&mut inventory, "x-1", "edge-1", 0.015);

    let entry = inventory.get_xnode("x-1").unwrap();
    assert_eq!(entry.id, "x-1");
    assert_eq!(entry.name, "edge-1");
    assert_eq!(entry.provider, "digitalocean");
    assert_eq!(entry.status, XNodeStatus::Running);
    assert!((entry.cost_hourly - 0.015).abs() < 1e-9);
}

#[test]
fn test_duplicate_id_rejected_and_store_unchanged() {
    let dir = TempDir::new().unwrap();
    let mut inventory = Inventory::open(dir.path().join("inventory.json")).unwrap();
    add(&mut inventory, "x-1", "edge-1", 0.015);

    let dup = XNode::new("x-1", "other", XNodeStatus::Stopped, "203.0.113.99");
    let err = inventory
        .add_xnode(&dup, "vultr".to_string(), "vultr-vc2-1".to_string(), 0.004, vec![])
        .unwrap_err();
    assert!(matches!(err, InventoryError::DuplicateId(_)));

    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory.get_xnode("x-1").unwrap().name, "edge-1");
}

#[test]
fn test_remove_closes_the_deployment_record() {
    let dir = TempDir::new().unwrap();
    let mut inventory = Inventory::open(dir.path().join("inventory.json")).unwrap();
    add(&mut inventory, "x-1", "edge-1", 0.015);
    inventory.remove_xnode("x-1").unwrap();

    assert!(inventory.get_xnode("x-1").is_none());
    let history = inventory.get_deployment_history(Some("x-1"), None, None);
    assert_eq!(history.len(), 1);

    let record = history[0];
    let terminated_at = record.terminated_at.unwrap();
    let expected_uptime =
        (terminated_at - record.deployed_at).num_seconds() as f64 / 3600.0;
    assert!((record.uptime_hours - expected_uptime).abs() < 1e-6);
    assert!((record.total_cost - record.uptime_hours * 0.015).abs() < 1e-9);
}

#[test]
fn test_cost_identities_over_running_entries_only() {
    let dir = TempDir::new().unwrap();
    let mut inventory = Inventory::open(dir.path().join("inventory.json")).unwrap();
    add(&mut inventory, "x-1", "edge-1", 0.015);
    add(&mut inventory, "x-2", "edge-2", 0.060);
    inventory
        .update_xnode(
            "x-2",
            XNodeUpdate {
                status: Some(XNodeStatus::Stopped),
                ..Default::default()
            },
        )
        .unwrap();

    let cost = inventory.get_total_cost();
    assert!((cost["hourly"] - 0.015).abs() < 1e-9);
    assert!((cost["daily"] - cost["hourly"] * 24.0).abs() < 1e-9);
    assert!((cost["monthly"] - cost["daily"] * 30.0).abs() < 1e-9);
    assert!((cost["annual"] - cost["daily"] * 365.0).abs() < 1e-9);
}

// The do-basic-2 scenario: one 2 vCPU / 2 GB droplet at $0.015/hr comes
// out to roughly $10.80 over a 30-day month.
#[test]
fn test_do_basic_2_monthly_projection() {
    let dir = TempDir::new().unwrap();
    let mut inventory = Inventory::open(dir.path().join("inventory.json")).unwrap();
    add(&mut inventory, "x-1", "edge-1", 0.015);

    let cost = inventory.get_total_cost();
    assert!((cost["monthly"] - 10.80).abs() < 1e-6);

    let report = inventory.get_cost_report();
    assert_eq!(report.active_count, 1);
    assert!((report.total_monthly - 10.80).abs() < 1e-6);
    assert!((report.by_provider["digitalocean"] - 0.015).abs() < 1e-9);
}

#[test]
fn test_store_survives_reopen_and_keeps_a_backup() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("inventory.json");
    {
        let mut inventory = Inventory::open(&path).unwrap();
        add(&mut inventory, "x-1", "edge-1", 0.015);
        add(&mut inventory, "x-2", "edge-2", 0.060);
    }

    let inventory = Inventory::open(&path).unwrap();
    assert_eq!(inventory.len(), 2);
    assert!(dir.path().join("inventory.json.backup").exists());
}

#[test]
fn test_csv_round_trip_into_empty_store() {
    let dir = TempDir::new().unwrap();
    let mut source = Inventory::open(dir.path().join("a.json")).unwrap();
    add(&mut source, "x-1", "edge-1", 0.015);
    add(&mut source, "x-2", "edge-2", 0.060);

    let csv = dir.path().join("fleet.csv");
    source.export_csv(&csv).unwrap();

    let mut target = Inventory::open(dir.path().join("b.json")).unwrap();
    assert_eq!(target.import_csv(&csv).unwrap(), 2);
    for id in ["x-1", "x-2"] {
        let from = source.get_xnode(id).unwrap();
        let to = target.get_xnode(id).unwrap();
        assert_eq!(from.name, to.name);
        assert_eq!(from.provider, to.provider);
        assert_eq!(from.status, to.status);
        assert_eq!(from.ip_address, to.ip_address);
    }

    // Importing again into the now non-empty store adds nothing
    assert_eq!(target.import_csv(&csv).unwrap(), 0);
    assert_eq!(target.len(), 2);
}

#[test]
fn test_search_and_tag_filters() {
    let dir = TempDir::new().unwrap();
    let mut inventory = Inventory::open(dir.path().join("inventory.json")).unwrap();
    add(&mut inventory, "x-1", "edge-paris", 0.015);
    add(&mut inventory, "x-2", "core-berlin", 0.060);

    assert_eq!(inventory.search("PARIS").len(), 1);
    assert_eq!(inventory.search("x-").len(), 2);
    assert_eq!(inventory.search("nothing").len(), 0);

    let tagged = inventory.list_by_tags(&["edge".to_string()], true);
    assert_eq!(tagged.len(), 2);
    let tagged = inventory.list_by_tags(&["edge".to_string(), "gpu".to_string()], true);
    assert!(tagged.is_empty());
}

#[test]
fn test_history_cleanup_keeps_active_records() {
    let dir = TempDir::new().unwrap();
    let mut inventory = Inventory::open(dir.path().join("inventory.json")).unwrap();
    add(&mut inventory, "x-1", "edge-1", 0.015);
    add(&mut inventory, "x-2", "edge-2", 0.060);
    inventory.remove_xnode("x-2").unwrap();

    // The terminated record is recent, nothing to prune yet
    assert_eq!(inventory.cleanup_old_history(30).unwrap(), 0);
    assert_eq!(inventory.get_deployment_history(None, None, None).len(), 2);
}

#[test]
fn test_statistics_partition_deployments() {
    let dir = TempDir::new().unwrap();
    let mut inventory = Inventory::open(dir.path().join("inventory.json")).unwrap();
    add(&mut inventory, "x-1", "edge-1", 0.015);
    add(&mut inventory, "x-2", "edge-2", 0.060);
    inventory.remove_xnode("x-1").unwrap();

    let stats = inventory.get_statistics();
    assert_eq!(stats.total_xnodes, 1);
    assert_eq!(stats.total_deployments, 2);
    assert_eq!(stats.active_deployments, 1);
    assert_eq!(stats.terminated_deployments, 1);
    assert_eq!(stats.provider_distribution["digitalocean"], 1);
    assert_eq!(stats.most_expensive[0].id, "x-2");
}

#[test]
fn test_history_is_newest_first_with_limit() {
    let dir = TempDir::new().unwrap();
    let mut inventory = Inventory::open(dir.path().join("inventory.json")).unwrap();

    let mut old = XNode::new("x-old", "old", XNodeStatus::Running, "203.0.113.1");
    old.created_at = Utc::now() - Duration::days(10);
    inventory
        .add_xnode(&old, "vultr".to_string(), "vultr-vc2-1".to_string(), 0.004, vec![])
        .unwrap();
    add(&mut inventory, "x-new", "new", 0.015);

    let history = inventory.get_deployment_history(None, None, Some(1));
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].xnode_id, "x-new");
}
