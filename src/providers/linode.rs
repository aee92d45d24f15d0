// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/providers/linode.rs - Linode instances backend

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{DeployConfig, Instance, Provider, ProviderError, ProviderResult, ProviderTemplate};
use crate::api::{ApiClient, ApiError};

const API_BASE: &str = "https://api.linode.com/v4";

pub struct LinodeProvider {
    name: String,
    client: Option<ApiClient>,
    templates: Vec<ProviderTemplate>,
    regions: Vec<String>,
}

impl LinodeProvider {
    pub fn new(api_key: Option<String>) -> ProviderResult<Self> {
        let client = match api_key {
            Some(key) => Some(ApiClient::builder(API_BASE).bearer_auth(key).build()?),
            None => None,
        };

        Ok(Self {
            name: "linode".to_string(),
            client,
            templates: catalog(),
            regions: vec![
                "us-east".into(),
                "us-west".into(),
                "us-central".into(),
                "us-southeast".into(),
                "eu-west".into(),
                "eu-central".into(),
                "ap-south".into(),
                "ap-northeast".into(),
                "ap-southeast".into(),
                "ca-central".into(),
                "au-sydney".into(),
            ],
        })
    }

    fn client(&self) -> ProviderResult<&ApiClient> {
        self.client.as_ref().ok_or(ProviderError::CredentialMissing {
            provider: self.name.clone(),
        })
    }

    fn instance_type(template_id: &str) -> &'static str {
        match template_id {
            "linode-nanode-1gb" => "g6-nanode-1",
            "linode-2gb" => "g6-standard-1",
            "linode-4gb" => "g6-standard-2",
            "linode-dedicated-4gb" => "g6-dedicated-2",
            "linode-dedicated-8gb" => "g6-dedicated-4",
            "linode-gpu-rtx6000" => "g1-gpu-rtx6000-1",
            _ => "g6-nanode-1",
        }
    }

    fn parse_linode(&self, v: &Value, template: &str, cost_hourly: f64) -> Instance {
        let status = match v["status"].as_str().unwrap_or("provisioning") {
            "running" => "running",
            "offline" | "stopped" => "stopped",
            "provisioning" | "booting" => "deploying",
            other => other,
        };

        Instance {
            id: v["id"].as_u64().map(|n| n.to_string()).unwrap_or_default(),
            name: v["label"].as_str().unwrap_or("").to_string(),
            provider: self.name.clone(),
            template: template.to_string(),
            region: v["region"].as_str().unwrap_or("").to_string(),
            status: status.to_string(),
            ip_address: v["ipv4"]
                .as_array()
                .and_then(|ips| ips.first())
                .and_then(|ip| ip.as_str())
                .unwrap_or("")
                .to_string(),
            cost_hourly,
            metadata: None,
        }
    }
}

#[async_trait::async_trait]
impl Provider for LinodeProvider {
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
            "label": config.name,
            "region": config.region,
            "type": Self::instance_type(template_id),
            "image": config.os.as_deref().unwrap_or("linode/ubuntu22.04"),
            "authorized_keys": config.ssh_keys.clone().unwrap_or_default(),
            "booted": true,
        });

        info!(template_id, region = %config.region, "deploying linode");
        let response: Value = client.post("/linode/instances", Some(&body)).await?;
        Ok(self.parse_linode(&response, template_id, cost_hourly))
    }

    async fn list_instances(&self) -> ProviderResult<Vec<Instance>> {
        let client = match self.client() {
            Ok(c) => c,
            Err(_) => return Ok(Vec::new()),
        };

        match client.get::<Value>("/linode/instances", None).await {
            Ok(response) => Ok(response["data"]
                .as_array()
                .map(|list| list.iter().map(|v| self.parse_linode(v, "", 0.0)).collect())
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
            .get::<Value>(&format!("/linode/instances/{instance_id}"), None)
            .await
        {
            Ok(response) => Ok(self.parse_linode(&response, "", 0.0)),
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
            .delete(&format!("/linode/instances/{instance_id}"))
            .await?;
        info!(provider = %self.name, instance_id, "linode deleted");
        Ok(true)
    }

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        let client = self.client()?;
        let _: Value = client
            .post(&format!("/linode/instances/{instance_id}/boot"), None)
            .await?;
        Ok(true)
    }

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        let client = self.client()?;
        let _: Value = client
            .post(&format!("/linode/instances/{instance_id}/shutdown"), None)
            .await?;
        Ok(true)
    }
}

fn catalog() -> Vec<ProviderTemplate> {
    vec![
        ProviderTemplate {
            id: "linode-nanode-1gb".into(),
            name: "Nanode 1GB".into(),
            provider: "linode".into(),
            cpu: 1,
            memory_gb: 1,
            storage_gb: 25,
            bandwidth_tb: 1.0,
            price_hourly: 0.0075,
            price_monthly: 5.00,
            gpu: None,
            regions: vec![
                "us-east".into(),
                "us-west".into(),
                "eu-west".into(),
                "eu-central".into(),
                "ap-south".into(),
            ],
            features: vec!["ssd".into(), "cloud".into()],
        },
        ProviderTemplate {
            id: "linode-2gb".into(),
            name: "Linode 2GB".into(),
            provider: "linode".into(),
            cpu: 1,
            memory_gb: 2,
            storage_gb: 50,
            bandwidth_tb: 2.0,
            price_hourly: 0.015,
            price_monthly: 10.00,
            gpu: None,
            regions: vec![
                "us-east".into(),
                "us-west".into(),
                "us-central".into(),
                "eu-west".into(),
                "eu-central".into(),
                "ap-south".into(),
                "ap-northeast".into(),
            ],
            features: vec!["ssd".into(), "cloud".into()],
        },
        ProviderTemplate {
            id: "linode-4gb".into(),
            name: "Linode 4GB".into(),
            provider: "linode".into(),
            cpu: 2,
            memory_gb: 4,
            storage_gb: 80,
            bandwidth_tb: 4.0,
            price_hourly: 0.030,
            price_monthly: 20.00,
            gpu: None,
            regions: vec![
                "us-east".into(),
                "us-west".into(),
                "us-central".into(),
                "eu-west".into(),
                "eu-central".into(),
                "ap-south".into(),
                "ap-northeast".into(),
                "ap-southeast".into(),
            ],
            features: vec!["ssd".into(), "cloud".into()],
        },
        ProviderTemplate {
            id: "linode-dedicated-4gb".into(),
            name: "Dedicated 4GB".into(),
            provider: "linode".into(),
            cpu: 2,
            memory_gb: 4,
            storage_gb: 80,
            bandwidth_tb: 4.0,
            price_hourly: 0.045,
            price_monthly: 30.00,
            gpu: None,
            regions: vec![
                "us-east".into(),
                "us-west".into(),
                "eu-west".into(),
                "ap-south".into(),
            ],
            features: vec!["ssd".into(), "cloud".into(), "dedicated-cpu".into()],
        },
        ProviderTemplate {
            id: "linode-dedicated-8gb".into(),
            name: "Dedicated 8GB".into(),
            provider: "linode".into(),
            cpu: 4,
            memory_gb: 8,
            storage_gb: 160,
            bandwidth_tb: 5.0,
            price_hourly: 0.090,
            price_monthly: 60.00,
            gpu: None,
            regions: vec![
                "us-east".into(),
                "us-west".into(),
                "us-central".into(),
                "eu-west".into(),
                "eu-central".into(),
                "ap-south".into(),
            ],
            features: vec![
                "ssd".into(),
                "cloud".into(),
                "dedicated-cpu".into(),
                "high-memory".into(),
            ],
        },
        ProviderTemplate {
            id: "linode-gpu-rtx6000".into(),
            name: "GPU RTX6000".into(),
            provider: "linode".into(),
            cpu: 24,
            memory_gb: 64,
            storage_gb: 640,
            bandwidth_tb: 10.0,
            price_hourly: 1.50,
            price_monthly: 1000.00,
            gpu: Some("NVIDIA RTX 6000".into()),
            regions: vec!["us-east".into(), "eu-west".into()],
            features: vec![
                "ssd".into(),
                "cloud".into(),
                "gpu".into(),
                "dedicated-cpu".into(),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_template_present() {
        let provider = LinodeProvider::new(None).unwrap();
        let gpu: Vec<_> = provider.templates().iter().filter(|t| t.has_gpu()).collect();
        assert_eq!(gpu.len(), 1);
        assert_eq!(gpu[0].id, "linode-gpu-rtx6000");
    }

    #[test]
    fn test_parse_linode_status_mapping() {
        let provider = LinodeProvider::new(None).unwrap();
        let v = serde_json::json!({
            "id": 7,
            "label": "node-1",
            "status": "offline",
            "region": "us-east",
            "ipv4": ["203.0.113.20"]
        });
        let instance = provider.parse_linode(&v, "", 0.0);
        assert_eq!(instance.status, "stopped");
        assert_eq!(instance.ip_address, "203.0.113.20");
    }
}
