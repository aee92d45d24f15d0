// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/providers/registry.rs - Provider registry and credential store

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{
    digitalocean::DigitalOceanProvider, equinix::EquinixProvider, hivelocity::HivelocityProvider,
    linode::LinodeProvider, vultr::VultrProvider, DeployConfig, Instance, Provider, ProviderError,
    ProviderResult, ProviderTemplate,
};

pub const PROVIDER_NAMES: [&str; 5] =
    ["digitalocean", "equinix", "hivelocity", "linode", "vultr"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredential {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// YAML-backed map of provider name to credential.
///
/// When the file has no key for a provider, `{PROVIDER}_API_KEY` in the
/// environment is consulted so CI and one-off shells work without a
/// config file.
pub struct CredentialStore {
    path: PathBuf,
    entries: HashMap<String, ProviderCredential>,
}

impl CredentialStore {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&content)?
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), providers = entries.len(), "credential store loaded");
        Ok(Self { path, entries })
    }

    pub fn api_key(&self, provider: &str) -> Option<String> {
        self.entries
            .get(provider)
            .and_then(|c| c.api_key.clone())
            .or_else(|| {
                let var = format!("{}_API_KEY", provider.to_uppercase());
                std::env::var(&var).ok().filter(|v| !v.is_empty())
            })
    }

    pub fn set_api_key(&mut self, provider: &str, api_key: String) -> anyhow::Result<()> {
        self.entries
            .entry(provider.to_string())
            .or_default()
            .api_key = Some(api_key);
        self.save()
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(&self.entries)?;
        std::fs::write(&self.path, yaml)?;
        Ok(())
    }
}

/// Owns one instance of every supported provider, rebuilt when its
/// credential changes.
pub struct ProviderRegistry {
    store: CredentialStore,
    providers: HashMap<String, Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new(store: CredentialStore) -> anyhow::Result<Self> {
        let mut registry = Self {
            store,
            providers: HashMap::new(),
        };
        for name in PROVIDER_NAMES {
            registry.providers.insert(name.to_string(), registry.build_provider(name)?);
        }
        Ok(registry)
    }

    fn build_provider(&self, name: &str) -> ProviderResult<Box<dyn Provider>> {
        let api_key = self.store.api_key(name);
        let provider: Box<dyn Provider> = match name {
            "digitalocean" => Box::new(DigitalOceanProvider::new(api_key)?),
            "vultr" => Box::new(VultrProvider::new(api_key)?),
            "linode" => Box::new(LinodeProvider::new(api_key)?),
            "hivelocity" => Box::new(HivelocityProvider::new(api_key)?),
            "equinix" => Box::new(EquinixProvider::new(api_key)?),
            other => return Err(ProviderError::UnknownProvider(other.to_string())),
        };
        Ok(provider)
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_provider(&self, name: &str) -> ProviderResult<&dyn Provider> {
        self.providers
            .get(name)
            .map(|p| p.as_ref())
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    pub fn get_all_templates(&self) -> Vec<ProviderTemplate> {
        let mut templates = Vec::new();
        for name in self.list_providers() {
            templates.extend(self.providers[&name].templates().to_vec());
        }
        templates
    }

    /// Filter the cross-provider catalog and rank it by hourly price.
    /// The sort is stable so equally priced templates keep their
    /// provider-name order.
    pub fn compare_templates(
        &self,
        min_cpu: u32,
        min_memory: u32,
        max_price: f64,
    ) -> Vec<ProviderTemplate> {
        let mut templates: Vec<ProviderTemplate> = self
            .get_all_templates()
            .into_iter()
            .filter(|t| {
                t.cpu >= min_cpu && t.memory_gb >= min_memory && t.price_hourly <= max_price
            })
            .collect();

        templates.sort_by(|a, b| {
            a.price_hourly
                .partial_cmp(&b.price_hourly)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        templates
    }

    pub fn get_cheapest_option(&self, min_cpu: u32, min_memory: u32) -> Option<ProviderTemplate> {
        self.compare_templates(min_cpu, min_memory, f64::MAX)
            .into_iter()
            .next()
    }

    pub fn get_gpu_templates(&self) -> Vec<ProviderTemplate> {
        self.get_all_templates()
            .into_iter()
            .filter(|t| t.gpu.is_some())
            .collect()
    }

    pub async fn deploy_to_provider(
        &self,
        provider_name: &str,
        template_id: &str,
        config: &DeployConfig,
    ) -> ProviderResult<Instance> {
        self.get_provider(provider_name)?
            .deploy(template_id, config)
            .await
    }

    /// Persist a credential and rebuild only the affected provider.
    pub fn configure_provider(&mut self, name: &str, api_key: String) -> anyhow::Result<()> {
        if !self.providers.contains_key(name) {
            return Err(ProviderError::UnknownProvider(name.to_string()).into());
        }

        self.store.set_api_key(name, api_key)?;
        let rebuilt = self.build_provider(name)?;
        self.providers.insert(name.to_string(), rebuilt);
        info!(provider = name, "provider credential configured");
        Ok(())
    }
}
