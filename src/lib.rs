// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod inventory;
pub mod monitoring;
pub mod providers;

// Re-export main types from each module
pub use api::{ApiClient, ApiClientBuilder, ApiError, AuthMethod};
pub use inventory::{
    CostReport, Inventory, InventoryEntry, InventoryError, InventoryStatistics, XNode, XNodeStatus,
    XNodeUpdate,
};
pub use monitoring::{
    Alert, AlertSeverity, AlertType, DashboardData, FleetTarget, HealthCheck, HealthStatus,
    MonitoringConfig, MonitoringEngine, ResourceMetrics, XNodeStatusReport,
};
pub use providers::{
    CredentialStore, DeployConfig, Instance, Provider, ProviderError, ProviderRegistry,
    ProviderTemplate, PROVIDER_NAMES,
};
