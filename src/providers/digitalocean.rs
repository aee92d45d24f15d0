// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/providers/digitalocean.rs - DigitalOcean droplets backend

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{DeployConfig, Instance, Provider, ProviderError, ProviderResult, ProviderTemplate};
use crate::api::{ApiClient, ApiError};

const API_BASE: &str = "https://api.digitalocean.com/v2";

pub struct DigitalOceanProvider {
    name: String,
    client: Option<ApiClient>,
    templates: Vec<ProviderTemplate>,
    regions: Vec<String>,
}

impl DigitalOceanProvider {
    pub fn new(api_key: Option<String>) -> ProviderResult<Self> {
        let client = match api_key {
            Some(key) => Some(ApiClient::builder(API_BASE).bearer_auth(key).build()?),
            None => None,
        };

        Ok(Self {
            name: "digitalocean".to_string(),
            client,
            templates: catalog(),
            regions: vec![
                "nyc1".into(),
                "nyc3".into(),
                "sfo3".into(),
                "lon1".into(),
                "fra1".into(),
                "sgp1".into(),
                "tor1".into(),
                "ams3".into(),
            ],
        })
    }

    fn client(&self) -> ProviderResult<&ApiClient> {
        self.client.as_ref().ok_or(ProviderError::CredentialMissing {
            provider: self.name.clone(),
        })
    }

    /// Droplet size slug for one of our catalog templates.
    fn size_slug(template_id: &str) -> &'static str {
        match template_id {
            "do-basic-1" => "s-1vcpu-1gb",
            "do-basic-2" => "s-2vcpu-2gb",
            "do-standard-4" => "s-4vcpu-8gb",
            "do-cpu-8" => "c-8",
            _ => "s-1vcpu-1gb",
        }
    }

    fn parse_droplet(&self, droplet: &Value, template: &str, cost_hourly: f64) -> Instance {
        let ip_address = droplet["networks"]["v4"]
            .as_array()
            .and_then(|nets| {
                nets.iter()
                    .find(|n| n["type"].as_str() == Some("public"))
                    .or_else(|| nets.first())
            })
            .and_then(|n| n["ip_address"].as_str())
            .unwrap_or("")
            .to_string();

        let status = match droplet["status"].as_str().unwrap_or("new") {
            "active" => "running",
            "off" => "stopped",
            "new" => "deploying",
            other => other,
        };

        Instance {
            id: droplet["id"]
                .as_u64()
                .map(|n| n.to_string())
                .unwrap_or_default(),
            name: droplet["name"].as_str().unwrap_or("").to_string(),
            provider: self.name.clone(),
            template: template.to_string(),
            region: droplet["region"]["slug"].as_str().unwrap_or("").to_string(),
            status: status.to_string(),
            ip_address,
            cost_hourly,
            metadata: None,
        }
    }

    async fn power_action(&self, instance_id: &str, action: &str) -> ProviderResult<bool> {
        let client = self.client()?;
        let body = json!({ "type": action });
        let _: Value = client
            .post(&format!("/droplets/{instance_id}/actions"), Some(&body))
            .await?;
        info!(provider = %self.name, instance_id, action, "power action issued");
        Ok(true)
    }
}

#[async_trait::async_trait]
impl Provider for DigitalOceanProvider {
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
            "name": config.name,
            "region": config.region,
            "size": Self::size_slug(template_id),
            "image": config.os.as_deref().unwrap_or("ubuntu-22-04-x64"),
            "ssh_keys": config.ssh_keys.clone().unwrap_or_default(),
        });

        info!(template_id, region = %config.region, "deploying droplet");
        let response: Value = client.post("/droplets", Some(&body)).await?;
        Ok(self.parse_droplet(&response["droplet"], template_id, cost_hourly))
    }

    async fn list_instances(&self) -> ProviderResult<Vec<Instance>> {
        let client = match self.client() {
            Ok(c) => c,
            Err(_) => return Ok(Vec::new()),
        };

        match client.get::<Value>("/droplets", None).await {
            Ok(response) => Ok(response["droplets"]
                .as_array()
                .map(|droplets| {
                    droplets
                        .iter()
                        .map(|d| self.parse_droplet(d, "", 0.0))
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
            .get::<Value>(&format!("/droplets/{instance_id}"), None)
            .await
        {
            Ok(response) => Ok(self.parse_droplet(&response["droplet"], "", 0.0)),
            Err(ApiError::ResourceNotFound { .. }) => Err(ProviderError::InstanceNotFound {
                provider: self.name.clone(),
                instance: instance_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        let client = self.client()?;
        let _: Value = client.delete(&format!("/droplets/{instance_id}")).await?;
        info!(provider = %self.name, instance_id, "droplet deleted");
        Ok(true)
    }

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        self.power_action(instance_id, "power_on").await
    }

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        self.power_action(instance_id, "power_off").await
    }
}

fn catalog() -> Vec<ProviderTemplate> {
    vec![
        ProviderTemplate {
            id: "do-basic-1".into(),
            name: "Basic (1 vCPU)".into(),
            provider: "digitalocean".into(),
            cpu: 1,
            memory_gb: 1,
            storage_gb: 25,
            bandwidth_tb: 1.0,
            price_hourly: 0.007,
            price_monthly: 5.00,
            gpu: None,
            regions: vec![
                "nyc1".into(),
                "nyc3".into(),
                "sfo3".into(),
                "lon1".into(),
                "fra1".into(),
            ],
            features: vec!["ssd".into(), "cloud".into()],
        },
        ProviderTemplate {
            id: "do-basic-2".into(),
            name: "Basic (2 vCPU)".into(),
            provider: "digitalocean".into(),
            cpu: 2,
            memory_gb: 2,
            storage_gb: 50,
            bandwidth_tb: 2.0,
            price_hourly: 0.015,
            price_monthly: 12.00,
            gpu: None,
            regions: vec![
                "nyc1".into(),
                "nyc3".into(),
                "sfo3".into(),
                "lon1".into(),
                "fra1".into(),
                "sgp1".into(),
            ],
            features: vec!["ssd".into(), "cloud".into()],
        },
        ProviderTemplate {
            id: "do-standard-4".into(),
            name: "Standard (4 vCPU)".into(),
            provider: "digitalocean".into(),
            cpu: 4,
            memory_gb: 8,
            storage_gb: 160,
            bandwidth_tb: 5.0,
            price_hourly: 0.071,
            price_monthly: 48.00,
            gpu: None,
            regions: vec![
                "nyc1".into(),
                "nyc3".into(),
                "sfo3".into(),
                "lon1".into(),
                "fra1".into(),
                "sgp1".into(),
                "tor1".into(),
            ],
            features: vec!["ssd".into(), "cloud".into(), "monitoring".into()],
        },
        ProviderTemplate {
            id: "do-cpu-8".into(),
            name: "CPU Optimized (8 vCPU)".into(),
            provider: "digitalocean".into(),
            cpu: 8,
            memory_gb: 16,
            storage_gb: 200,
            bandwidth_tb: 6.0,
            price_hourly: 0.238,
            price_monthly: 160.00,
            gpu: None,
            regions: vec!["nyc1".into(), "sfo3".into(), "lon1".into(), "fra1".into()],
            features: vec!["ssd".into(), "cloud".into(), "cpu-optimized".into()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deploy_without_credential_reports_missing_template_first() {
        let provider = DigitalOceanProvider::new(None).unwrap();
        let config = DeployConfig::new("node-1", "nyc1");

        let err = provider.deploy("no-such-template", &config).await.unwrap_err();
        assert!(matches!(err, ProviderError::TemplateNotFound { .. }));

        let err = provider.deploy("do-basic-2", &config).await.unwrap_err();
        assert!(matches!(err, ProviderError::CredentialMissing { .. }));
    }

    #[tokio::test]
    async fn test_list_without_credential_is_empty() {
        let provider = DigitalOceanProvider::new(None).unwrap();
        assert!(provider.list_instances().await.unwrap().is_empty());
    }

    #[test]
    fn test_catalog_contains_basic_2() {
        let provider = DigitalOceanProvider::new(None).unwrap();
        let t = provider.get_template("do-basic-2").unwrap();
        assert_eq!(t.cpu, 2);
        assert_eq!(t.memory_gb, 2);
        assert_eq!(t.price_hourly, 0.015);
        assert_eq!(t.price_monthly, 12.00);
    }

    #[test]
    fn test_parse_droplet_picks_public_ip() {
        let provider = DigitalOceanProvider::new(None).unwrap();
        let droplet = serde_json::json!({
            "id": 42,
            "name": "node-1",
            "status": "active",
            "region": { "slug": "nyc1" },
            "networks": { "v4": [
                { "type": "private", "ip_address": "10.0.0.5" },
                { "type": "public", "ip_address": "203.0.113.9" }
            ]}
        });
        let instance = provider.parse_droplet(&droplet, "do-basic-2", 0.015);
        assert_eq!(instance.id, "42");
        assert_eq!(instance.status, "running");
        assert_eq!(instance.ip_address, "203.0.113.9");
    }
}
