// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/monitoring/alerts.rs - Alert types, dedup store and delivery channels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighCpu,
    HighMemory,
    LowDisk,
    ServiceDown,
    SshUnreachable,
    HttpError,
    CostThreshold,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertType::HighCpu => "high_cpu",
            AlertType::HighMemory => "high_memory",
            AlertType::LowDisk => "low_disk",
            AlertType::ServiceDown => "service_down",
            AlertType::SshUnreachable => "ssh_unreachable",
            AlertType::HttpError => "http_error",
            AlertType::CostThreshold => "cost_threshold",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub xnode_id: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Alert {
    pub fn new(
        xnode_id: String,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            xnode_id,
            alert_type,
            severity,
            message,
            timestamp: Utc::now(),
            acknowledged: false,
            resolved: false,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDeliveryConfig {
    pub console_alerts: bool,
    pub email_alerts: bool,
    pub webhook_alerts: bool,
    pub slack_alerts: bool,
    #[serde(default)]
    pub email_recipients: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_webhook_url: Option<String>,
}

impl Default for AlertDeliveryConfig {
    fn default() -> Self {
        Self {
            console_alerts: true,
            email_alerts: false,
            webhook_alerts: false,
            slack_alerts: false,
            email_recipients: Vec::new(),
            webhook_url: None,
            slack_webhook_url: None,
        }
    }
}

/// Fans one alert out to every enabled channel. Remote channel failures
/// are logged and swallowed so a dead webhook can never stall the
/// monitoring loop.
pub struct AlertDispatcher {
    config: AlertDeliveryConfig,
    client: Option<reqwest::Client>,
}

impl AlertDispatcher {
    pub fn new(config: AlertDeliveryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok();
        if client.is_none() {
            error!("HTTP client construction failed, webhook and slack delivery disabled");
        }
        Self { config, client }
    }

    pub async fn deliver(&self, alert: &Alert) {
        if self.config.console_alerts {
            self.deliver_console(alert);
        }

        if self.config.email_alerts && !self.config.email_recipients.is_empty() {
            self.deliver_email(alert);
        }

        if self.config.webhook_alerts {
            if let Some(url) = self.config.webhook_url.clone() {
                self.deliver_webhook(alert, &url).await;
            }
        }

        if self.config.slack_alerts {
            if let Some(url) = self.config.slack_webhook_url.clone() {
                self.deliver_slack(alert, &url).await;
            }
        }
    }

    fn deliver_console(&self, alert: &Alert) {
        warn!(
            xnode_id = %alert.xnode_id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            "ALERT: {}",
            alert.message
        );
    }

    // SMTP wiring is deferred; the recipients list is accepted so configs
    // written now stay valid once delivery lands.
    fn deliver_email(&self, alert: &Alert) {
        info!(
            recipients = self.config.email_recipients.len(),
            "email alert (delivery not yet wired): {}", alert.message
        );
    }

    async fn deliver_webhook(&self, alert: &Alert, url: &str) {
        let Some(client) = &self.client else { return };
        match client.post(url).json(alert).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "webhook delivery failed");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "webhook delivery failed"),
        }
    }

    async fn deliver_slack(&self, alert: &Alert, url: &str) {
        let Some(client) = &self.client else { return };

        let color = match alert.severity {
            AlertSeverity::Info => "#36a64f",
            AlertSeverity::Warning => "#ff9900",
            AlertSeverity::Critical => "#ff0000",
        };

        let payload = serde_json::json!({
            "attachments": [{
                "color": color,
                "title": format!("xNode Alert: {}", alert.xnode_id),
                "text": alert.message,
                "fields": [
                    {
                        "title": "Severity",
                        "value": alert.severity.to_string().to_uppercase(),
                        "short": true
                    },
                    {
                        "title": "Type",
                        "value": alert.alert_type.to_string(),
                        "short": true
                    },
                ],
                "footer": "OpenMesh Fleet Monitoring",
                "ts": alert.timestamp.timestamp()
            }]
        });

        match client.post(url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "slack delivery failed");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "slack delivery failed"),
        }
    }
}

/// In-memory alert set keyed by alert id.
///
/// Dedup keys on (xnode_id, alert_type) over unresolved alerts only. A
/// consequence worth knowing: while a WARNING for a pair stays
/// unresolved, a later CRITICAL crossing of the same pair is suppressed
/// too; the escalation surfaces only after the warning is resolved.
pub struct AlertStore {
    alerts: HashMap<String, Alert>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self {
            alerts: HashMap::new(),
        }
    }

    pub fn add_alert(&mut self, alert: Alert) {
        self.alerts.insert(alert.id.clone(), alert);
    }

    pub fn get_alert(&self, alert_id: &str) -> Option<&Alert> {
        self.alerts.get(alert_id)
    }

    pub fn acknowledge_alert(&mut self, alert_id: &str) -> bool {
        if let Some(alert) = self.alerts.get_mut(alert_id) {
            alert.acknowledged = true;
            return true;
        }
        false
    }

    /// Resolving drops the alert out of dedup and active listings at
    /// once; the record itself is kept until the store is pruned.
    pub fn resolve_alert(&mut self, alert_id: &str) -> bool {
        if let Some(alert) = self.alerts.get_mut(alert_id) {
            alert.resolved = true;
            return true;
        }
        false
    }

    pub fn get_active_alerts(&self) -> Vec<&Alert> {
        self.alerts.values().filter(|a| !a.resolved).collect()
    }

    pub fn get_alerts_for_xnode(&self, xnode_id: &str) -> Vec<&Alert> {
        self.alerts
            .values()
            .filter(|a| a.xnode_id == xnode_id && !a.resolved)
            .collect()
    }

    pub fn has_unresolved(&self, xnode_id: &str, alert_type: AlertType) -> bool {
        self.alerts
            .values()
            .any(|a| a.xnode_id == xnode_id && a.alert_type == alert_type && !a.resolved)
    }

    pub fn get_all_alerts(&self) -> Vec<&Alert> {
        self.alerts.values().collect()
    }

    pub fn load_from_map(&mut self, alerts: HashMap<String, Alert>) {
        self.alerts = alerts;
    }

    pub fn as_map(&self) -> &HashMap<String, Alert> {
        &self.alerts
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new()
    }
}
