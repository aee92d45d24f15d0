// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/providers/hivelocity.rs - Hivelocity bare metal backend

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{DeployConfig, Instance, Provider, ProviderError, ProviderResult, ProviderTemplate};
use crate::api::{ApiClient, ApiError};

const API_BASE: &str = "https://core.hivelocity.net/api/v2";

pub struct HivelocityProvider {
    name: String,
    client: Option<ApiClient>,
    templates: Vec<ProviderTemplate>,
    regions: Vec<String>,
}

impl HivelocityProvider {
    pub fn new(api_key: Option<String>) -> ProviderResult<Self> {
        let client = match api_key {
            Some(key) => Some(
                ApiClient::builder(API_BASE)
                    .api_key_auth("X-API-KEY", key)
                    .build()?,
            ),
            None => None,
        };

        Ok(Self {
            name: "hivelocity".to_string(),
            client,
            templates: catalog(),
            regions: vec![
                "atlanta".into(),
                "tampa".into(),
                "los-angeles".into(),
                "new-york".into(),
                "miami".into(),
            ],
        })
    }

    fn client(&self) -> ProviderResult<&ApiClient> {
        self.client.as_ref().ok_or(ProviderError::CredentialMissing {
            provider: self.name.clone(),
        })
    }

    fn product_id(template_id: &str) -> u32 {
        match template_id {
            "hive-small" => 580,
            "hive-medium" => 584,
            "hive-large" => 590,
            "hive-gpu" => 620,
            _ => 580,
        }
    }

    fn parse_device(&self, v: &Value, template: &str, cost_hourly: f64) -> Instance {
        let status = match v["powerStatus"].as_str().unwrap_or("") {
            "ON" => "running",
            "OFF" => "stopped",
            _ => "deploying",
        };

        Instance {
            id: v["deviceId"]
                .as_u64()
                .map(|n| n.to_string())
                .unwrap_or_default(),
            name: v["hostname"].as_str().unwrap_or("").to_string(),
            provider: self.name.clone(),
            template: template.to_string(),
            region: v["locationName"]
                .as_str()
                .unwrap_or("")
                .to_lowercase(),
            status: status.to_string(),
            ip_address: v["primaryIp"].as_str().unwrap_or("").to_string(),
            cost_hourly,
            metadata: None,
        }
    }

    async fn power_action(&self, instance_id: &str, action: &str) -> ProviderResult<bool> {
        let client = self.client()?;
        let _: Value = client
            .post(
                &format!("/device/{instance_id}/power?action={action}"),
                None,
            )
            .await?;
        info!(provider = %self.name, instance_id, action, "power action issued");
        Ok(true)
    }
}

#[async_trait::async_trait]
impl Provider for HivelocityProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn templates(&self) -> &[ProviderTemplate] {
        &self.templates
    }

    fn regions(&self) -> &[String] {
        &self.regions
    }

    async fn deploy(&self, template_id: &str, config: &DeployConfig) -> ProviderResult<Instance> {
        let template =
            self.get_template(template_id)
                .ok_or_else(|| ProviderError::TemplateNotFound {
                    provider: self.name.clone(),
                    template: template_id.to_string(),
                })?;
        let cost_hourly = template.price_hourly;
        let client = self.client()?;

        let body = json!({
            "hostname": config.name,
            "locationName": config.region,
            "productId": Self::product_id(template_id),
            "osName": config.os.as_deref().unwrap_or("Ubuntu 22.04"),
            "publicSshKeyId": config.ssh_keys.clone().unwrap_or_default(),
        });

        info!(template_id, region = %config.region, "provisioning bare metal device");
        let response: Value = client.post("/bare-metal-devices/", Some(&body)).await?;
        Ok(self.parse_device(&response, template_id, cost_hourly))
    }

    async fn list_instances(&self) -> ProviderResult<Vec<Instance>> {
        let client = match self.client() {
            Ok(c) => c,
            Err(_) => return Ok(Vec::new()),
        };

        match client.get::<Value>("/bare-metal-devices/", None).await {
            Ok(response) => Ok(response
                .as_array()
                .map(|list| list.iter().map(|v| self.parse_device(v, "", 0.0)).collect())
                .unwrap_or_default()),
            Err(e) => {
                warn!(provider = %self.name, error = %e, "device listing failed");
                Ok(Vec::new())
            }
        }
    }

    async fn get_instance(&self, instance_id: &str) -> ProviderResult<Instance> {
        let client = self.client()?;
        match client
            .get::<Value>(&format!("/bare-metal-devices/{instance_id}"), None)
            .await
        {
            Ok(response) => Ok(self.parse_device(&response, "", 0.0)),
            Err(ApiError::ResourceNotFound { .. }) => Err(ProviderError::InstanceNotFound {
                provider: self.name.clone(),
                instance: instance_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        let client = self.client()?;
        let _: Value = client
            .delete(&format!("/bare-metal-devices/{instance_id}"))
            .await?;
        info!(provider = %self.name, instance_id, "device released");
        Ok(true)
    }

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        self.power_action(instance_id, "boot").await
    }

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        self.power_action(instance_id, "shutdown").await
    }
}

fn catalog() -> Vec<ProviderTemplate> {
    vec![
        ProviderTemplate {
            id: "hive-small".into(),
            name: "Small Bare Metal".into(),
            provider: "hivelocity".into(),
            cpu: 4,
            memory_gb: 16,
            storage_gb: 500,
            bandwidth_tb: 10.0,
            price_hourly: 0.12,
            price_monthly: 85.00,
            gpu: None,
            regions: vec!["atlanta".into(), "tampa".into(), "los-angeles".into()],
            features: vec!["dedicated".into(), "bare-metal".into(), "ipmi".into()],
        },
        ProviderTemplate {
            id: "hive-medium".into(),
            name: "Medium Bare Metal".into(),
            provider: "hivelocity".into(),
            cpu: 8,
            memory_gb: 32,
            storage_gb: 1000,
            bandwidth_tb: 20.0,
            price_hourly: 0.25,
            price_monthly: 180.00,
            gpu: None,
            regions: vec![
                "atlanta".into(),
                "tampa".into(),
                "los-angeles".into(),
                "new-york".into(),
            ],
            features: vec![
                "dedicated".into(),
                "bare-metal".into(),
                "ipmi".into(),
                "raid".into(),
            ],
        },
        ProviderTemplate {
            id: "hive-large".into(),
            name: "Large Bare Metal".into(),
            provider: "hivelocity".into(),
            cpu: 16,
            memory_gb: 64,
            storage_gb: 2000,
            bandwidth_tb: 30.0,
            price_hourly: 0.50,
            price_monthly: 360.00,
            gpu: None,
            regions: vec![
                "atlanta".into(),
                "tampa".into(),
                "los-angeles".into(),
                "new-york".into(),
            ],
            features: vec![
                "dedicated".into(),
                "bare-metal".into(),
                "ipmi".into(),
                "raid".into(),
                "redundant-power".into(),
            ],
        },
        ProviderTemplate {
            id: "hive-gpu".into(),
            name: "GPU Bare Metal".into(),
            provider: "hivelocity".into(),
            cpu: 12,
            memory_gb: 96,
            storage_gb: 1500,
            bandwidth_tb: 20.0,
            price_hourly: 0.80,
            price_monthly: 575.00,
            gpu: Some("NVIDIA RTX 4090".into()),
            regions: vec!["atlanta".into(), "los-angeles".into()],
            features: vec![
                "dedicated".into(),
                "bare-metal".into(),
                "gpu".into(),
                "ipmi".into(),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_templates_are_bare_metal() {
        let provider = HivelocityProvider::new(None).unwrap();
        assert!(provider
            .templates()
            .iter()
            .all(|t| t.features.iter().any(|f| f == "bare-metal")));
    }

    #[test]
    fn test_parse_device_power_status() {
        let provider = HivelocityProvider::new(None).unwrap();
        let v = serde_json::json!({
            "deviceId": 9001,
            "hostname": "metal-1",
            "powerStatus": "ON",
            "locationName": "Atlanta",
            "primaryIp": "203.0.113.30"
        });
        let instance = provider.parse_device(&v, "hive-small", 0.12);
        assert_eq!(instance.status, "running");
        assert_eq!(instance.region, "atlanta");
    }
}
