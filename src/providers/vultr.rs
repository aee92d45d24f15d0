// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/providers/vultr.rs - Vultr instances backend

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{DeployConfig, Instance, Provider, ProviderError, ProviderResult, ProviderTemplate};
use crate::api::{ApiClient, ApiError};

const API_BASE: &str = "https://api.vultr.com/v2";

pub struct VultrProvider {
    name: String,
    client: Option<ApiClient>,
    templates: Vec<ProviderTemplate>,
    regions: Vec<String>,
}

impl VultrProvider {
    pub fn new(api_key: Option<String>) -> ProviderResult<Self> {
        let client = match api_key {
            Some(key) => Some(ApiClient::builder(API_BASE).bearer_auth(key).build()?),
            None => None,
        };

        Ok(Self {
            name: "vultr".to_string(),
            client,
            templates: catalog(),
            regions: vec![
                "ewr".into(),
                "ord".into(),
                "dfw".into(),
                "sea".into(),
                "lax".into(),
                "ams".into(),
                "fra".into(),
                "sgp".into(),
                "syd".into(),
            ],
        })
    }

    fn client(&self) -> ProviderResult<&ApiClient> {
        self.client.as_ref().ok_or(ProviderError::CredentialMissing {
            provider: self.name.clone(),
        })
    }

    fn plan_id(template_id: &str) -> &'static str {
        match template_id {
            "vultr-vc2-1" => "vc2-1c-1gb",
            "vultr-vc2-2" => "vc2-2c-4gb",
            "vultr-hf-4" => "vhf-4c-8gb",
            "vultr-bare-4" => "vbm-4c-32gb",
            _ => "vc2-1c-1gb",
        }
    }

    fn parse_instance(&self, v: &Value, template: &str, cost_hourly: f64) -> Instance {
        let status = match v["power_status"].as_str() {
            Some("running") => "running",
            Some("stopped") => "stopped",
            _ => match v["status"].as_str().unwrap_or("pending") {
                "active" => "running",
                "pending" => "deploying",
                other => other,
            },
        };

        Instance {
            id: v["id"].as_str().unwrap_or("").to_string(),
            name: v["label"].as_str().unwrap_or("").to_string(),
            provider: self.name.clone(),
            template: template.to_string(),
            region: v["region"].as_str().unwrap_or("").to_string(),
            status: status.to_string(),
            ip_address: v["main_ip"].as_str().unwrap_or("").to_string(),
            cost_hourly,
            metadata: None,
        }
    }
}

#[async_trait::async_trait]
impl Provider for VultrProvider {
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

        let mut body = json!({
            "label": config.name,
            "region": config.region,
            "plan": Self::plan_id(template_id),
            "os_id": 1743,
        });
        if let Some(keys) = &config.ssh_keys {
            body["sshkey_id"] = json!(keys);
        }

        info!(template_id, region = %config.region, "deploying vultr instance");
        let response: Value = client.post("/instances", Some(&body)).await?;
        Ok(self.parse_instance(&response["instance"], template_id, cost_hourly))
    }

    async fn list_instances(&self) -> ProviderResult<Vec<Instance>> {
        let client = match self.client() {
            Ok(c) => c,
            Err(_) => return Ok(Vec::new()),
        };

        match client.get::<Value>("/instances", None).await {
            Ok(response) => Ok(response["instances"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .map(|v| self.parse_instance(v, "", 0.0))
                        .collect()
                })
                .unwrap_or_default()),
            Err(e) => {
                warn!(provider = %self.name, error = %e, "instance listing failed");
                Ok(Vec::new())
            }
        }
    }

    async fn get_instance(&self, instance_id: &str) -> ProviderResult<Instance> {
        let client = self.client()?;
        match client
            .get::<Value>(&format!("/instances/{instance_id}"), None)
            .await
        {
            Ok(response) => Ok(self.parse_instance(&response["instance"], "", 0.0)),
            Err(ApiError::ResourceNotFound { .. }) => Err(ProviderError::InstanceNotFound {
                provider: self.name.clone(),
                instance: instance_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        let client = self.client()?;
        let _: Value = client.delete(&format!("/instances/{instance_id}")).await?;
        info!(provider = %self.name, instance_id, "instance deleted");
        Ok(true)
    }

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        let client = self.client()?;
        let _: Value = client
            .post(&format!("/instances/{instance_id}/start"), None)
            .await?;
        Ok(true)
    }

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        let client = self.client()?;
        let _: Value = client
            .post(&format!("/instances/{instance_id}/halt"), None)
            .await?;
        Ok(true)
    }
}

fn catalog() -> Vec<ProviderTemplate> {
    vec![
        ProviderTemplate {
            id: "vultr-vc2-1".into(),
            name: "VC2 1 vCPU".into(),
            provider: "vultr".into(),
            cpu: 1,
            memory_gb: 1,
            storage_gb: 25,
            bandwidth_tb: 1.0,
            price_hourly: 0.004,
            price_monthly: 2.50,
            gpu: None,
            regions: vec![
                "ewr".into(),
                "ord".into(),
                "dfw".into(),
                "sea".into(),
                "lax".into(),
            ],
            features: vec!["ssd".into(), "cloud".into()],
        },
        ProviderTemplate {
            id: "vultr-vc2-2".into(),
            name: "VC2 2 vCPU".into(),
            provider: "vultr".into(),
            cpu: 2,
            memory_gb: 4,
            storage_gb: 80,
            bandwidth_tb: 3.0,
            price_hourly: 0.018,
            price_monthly: 12.00,
            gpu: None,
            regions: vec![
                "ewr".into(),
                "ord".into(),
                "dfw".into(),
                "sea".into(),
                "lax".into(),
                "ams".into(),
            ],
            features: vec!["ssd".into(), "cloud".into()],
        },
        ProviderTemplate {
            id: "vultr-hf-4".into(),
            name: "High Frequency 4 vCPU".into(),
            provider: "vultr".into(),
            cpu: 4,
            memory_gb: 8,
            storage_gb: 128,
            bandwidth_tb: 4.0,
            price_hourly: 0.060,
            price_monthly: 42.00,
            gpu: None,
            regions: vec![
                "ewr".into(),
                "ord".into(),
                "lax".into(),
                "ams".into(),
                "sgp".into(),
            ],
            features: vec!["nvme".into(), "cloud".into(), "high-performance".into()],
        },
        ProviderTemplate {
            id: "vultr-bare-4".into(),
            name: "Bare Metal 4 Core".into(),
            provider: "vultr".into(),
            cpu: 4,
            memory_gb: 32,
            storage_gb: 240,
            bandwidth_tb: 5.0,
            price_hourly: 0.34,
            price_monthly: 240.00,
            gpu: None,
            regions: vec!["ewr".into(), "dfw".into()],
            features: vec!["bare-metal".into(), "nvme".into(), "dedicated".into()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_are_unique() {
        let provider = VultrProvider::new(None).unwrap();
        let mut ids: Vec<_> = provider.templates().iter().map(|t| &t.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), provider.templates().len());
    }

    #[test]
    fn test_parse_instance_power_status_wins() {
        let provider = VultrProvider::new(None).unwrap();
        let v = serde_json::json!({
            "id": "abc-123",
            "label": "node-1",
            "status": "active",
            "power_status": "stopped",
            "region": "ewr",
            "main_ip": "203.0.113.10"
        });
        let instance = provider.parse_instance(&v, "vultr-vc2-1", 0.004);
        assert_eq!(instance.status, "stopped");
    }

    #[tokio::test]
    async fn test_operations_without_credential() {
        let provider = VultrProvider::new(None).unwrap();
        assert!(provider.list_instances().await.unwrap().is_empty());
        let err = provider.delete_instance("x").await.unwrap_err();
        assert!(matches!(err, ProviderError::CredentialMissing { .. }));
    }
}
