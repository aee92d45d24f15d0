// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/providers/equinix.rs - Equinix Metal backend

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{DeployConfig, Instance, Provider, ProviderError, ProviderResult, ProviderTemplate};
use crate::api::{ApiClient, ApiError};

const API_BASE: &str = "https://api.equinix.com/metal/v1";

pub struct EquinixProvider {
    name: String,
    client: Option<ApiClient>,
    templates: Vec<ProviderTemplate>,
    regions: Vec<String>,
}

impl EquinixProvider {
    pub fn new(api_key: Option<String>) -> ProviderResult<Self> {
        let client = match api_key {
            Some(key) => Some(
                ApiClient::builder(API_BASE)
                    .api_key_auth("X-Auth-Token", key)
                    .build()?,
            ),
            None => None,
        };

        Ok(Self {
            name: "equinix".to_string(),
            client,
            templates: catalog(),
            regions: vec![
                "da".into(),
                "sv".into(),
                "ny".into(),
                "am".into(),
                "sg".into(),
                "ty".into(),
                "fr".into(),
            ],
        })
    }

    fn client(&self) -> ProviderResult<&ApiClient> {
        self.client.as_ref().ok_or(ProviderError::CredentialMissing {
            provider: self.name.clone(),
        })
    }

    fn plan_slug(template_id: &str) -> &'static str {
        match template_id {
            "equinix-c3-small" => "c3.small.x86",
            "equinix-c3-medium" => "c3.medium.x86",
            "equinix-g2-large" => "g2.large.x86",
            _ => "c3.small.x86",
        }
    }

    fn parse_device(&self, v: &Value, template: &str, cost_hourly: f64) -> Instance {
        let status = match v["state"].as_str().unwrap_or("queued") {
            "active" => "running",
            "inactive" | "powering_off" => "stopped",
            "queued" | "provisioning" => "deploying",
            other => other,
        };

        let ip_address = v["ip_addresses"]
            .as_array()
            .and_then(|ips| {
                ips.iter()
                    .find(|ip| ip["public"].as_bool() == Some(true))
            })
            .and_then(|ip| ip["address"].as_str())
            .unwrap_or("")
            .to_string();

        Instance {
            id: v["id"].as_str().unwrap_or("").to_string(),
            name: v["hostname"].as_str().unwrap_or("").to_string(),
            provider: self.name.clone(),
            template: template.to_string(),
            region: v["metro"]["code"].as_str().unwrap_or("").to_string(),
            status: status.to_string(),
            ip_address,
            cost_hourly,
            metadata: None,
        }
    }

    async fn device_action(&self, instance_id: &str, action: &str) -> ProviderResult<bool> {
        let client = self.client()?;
        let body = json!({ "type": action });
        let _: Value = client
            .post(&format!("/devices/{instance_id}/actions"), Some(&body))
            .await?;
        info!(provider = %self.name, instance_id, action, "device action issued");
        Ok(true)
    }
}

#[async_trait::async_trait]
impl Provider for EquinixProvider {
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
            "metro": config.region,
            "plan": Self::plan_slug(template_id),
            "operating_system": config.os.as_deref().unwrap_or("ubuntu_22_04"),
            "ssh_keys": config.ssh_keys.clone().unwrap_or_default(),
        });

        info!(template_id, metro = %config.region, "provisioning metal device");
        let response: Value = client.post("/devices", Some(&body)).await?;
        Ok(self.parse_device(&response, template_id, cost_hourly))
    }

    async fn list_instances(&self) -> ProviderResult<Vec<Instance>> {
        let client = match self.client() {
            Ok(c) => c,
            Err(_) => return Ok(Vec::new()),
        };

        match client.get::<Value>("/devices", None).await {
            Ok(response) => Ok(response["devices"]
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
            .get::<Value>(&format!("/devices/{instance_id}"), None)
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
        let _: Value = client.delete(&format!("/devices/{instance_id}")).await?;
        info!(provider = %self.name, instance_id, "device deleted");
        Ok(true)
    }

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        self.device_action(instance_id, "power_on").await
    }

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        self.device_action(instance_id, "power_off").await
    }
}

fn catalog() -> Vec<ProviderTemplate> {
    vec![
        ProviderTemplate {
            id: "equinix-c3-small".into(),
            name: "c3.small.x86".into(),
            provider: "equinix".into(),
            cpu: 8,
            memory_gb: 32,
            storage_gb: 240,
            bandwidth_tb: 20.0,
            price_hourly: 0.50,
            price_monthly: 350.00,
            gpu: None,
            regions: vec!["da".into(), "sv".into(), "ny".into(), "am".into()],
            features: vec!["bare-metal".into(), "nvme".into()],
        },
        ProviderTemplate {
            id: "equinix-c3-medium".into(),
            name: "c3.medium.x86".into(),
            provider: "equinix".into(),
            cpu: 24,
            memory_gb: 64,
            storage_gb: 960,
            bandwidth_tb: 20.0,
            price_hourly: 1.00,
            price_monthly: 700.00,
            gpu: None,
            regions: vec![
                "da".into(),
                "sv".into(),
                "ny".into(),
                "am".into(),
                "sg".into(),
            ],
            features: vec!["bare-metal".into(), "nvme".into(), "high-memory".into()],
        },
        ProviderTemplate {
            id: "equinix-g2-large".into(),
            name: "g2.large.x86 (GPU)".into(),
            provider: "equinix".into(),
            cpu: 24,
            memory_gb: 128,
            storage_gb: 1920,
            bandwidth_tb: 20.0,
            price_hourly: 3.00,
            price_monthly: 2100.00,
            gpu: Some("NVIDIA Tesla V100".into()),
            regions: vec!["da".into(), "sv".into(), "ny".into()],
            features: vec!["bare-metal".into(), "gpu".into(), "nvme".into()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_public_ip() {
        let provider = EquinixProvider::new(None).unwrap();
        let v = serde_json::json!({
            "id": "dev-1",
            "hostname": "metal-1",
            "state": "active",
            "metro": { "code": "da" },
            "ip_addresses": [
                { "public": false, "address": "10.0.0.4" },
                { "public": true, "address": "203.0.113.40" }
            ]
        });
        let instance = provider.parse_device(&v, "equinix-c3-small", 0.50);
        assert_eq!(instance.ip_address, "203.0.113.40");
        assert_eq!(instance.status, "running");
    }

    #[tokio::test]
    async fn test_deploy_validates_template_before_credential() {
        let provider = EquinixProvider::new(None).unwrap();
        let config = DeployConfig::new("metal-1", "da");
        let err = provider.deploy("bogus", &config).await.unwrap_err();
        assert!(matches!(err, ProviderError::TemplateNotFound { .. }));
    }
}
