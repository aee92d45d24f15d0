// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/providers/mod.rs - Provider abstraction and shared catalog types

pub mod digitalocean;
pub mod equinix;
pub mod hivelocity;
pub mod linode;
pub mod registry;
pub mod vultr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::api::ApiError;

pub use registry::{CredentialStore, ProviderRegistry, PROVIDER_NAMES};

/// A purchasable machine shape in a provider's catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderTemplate {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub cpu: u32,
    pub memory_gb: u32,
    pub storage_gb: u32,
    pub bandwidth_tb: f64,
    pub price_hourly: f64,
    pub price_monthly: f64,
    pub gpu: Option<String>,
    pub regions: Vec<String>,
    pub features: Vec<String>,
}

impl ProviderTemplate {
    pub fn price_annual(&self) -> f64 {
        self.price_monthly * 12.0
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }
}

/// Normalized view of a deployed machine, whatever the provider calls it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub template: String,
    pub region: String,
    pub status: String,
    pub ip_address: String,
    pub cost_hourly: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    pub name: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_keys: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl DeployConfig {
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            os: None,
            ssh_keys: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    pub fn with_ssh_keys(mut self, keys: Vec<String>) -> Self {
        self.ssh_keys = Some(keys);
        self
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("template '{template}' not found in {provider} catalog")]
    TemplateNotFound { provider: String, template: String },

    #[error("no API key configured for {provider}")]
    CredentialMissing { provider: String },

    #[error("instance '{instance}' not found on {provider}")]
    InstanceNotFound { provider: String, instance: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// One deployment backend.
///
/// Catalog accessors are synchronous (templates are static data); everything
/// touching the provider's API is async. `deploy` validates the template id
/// before the credential so an unconfigured provider still reports a bad
/// template correctly.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn templates(&self) -> &[ProviderTemplate];

    fn regions(&self) -> &[String];

    fn get_template(&self, template_id: &str) -> Option<&ProviderTemplate> {
        self.templates().iter().find(|t| t.id == template_id)
    }

    async fn deploy(&self, template_id: &str, config: &DeployConfig) -> ProviderResult<Instance>;

    /// Listing degrades to an empty fleet when the provider is unreachable
    /// or unconfigured. Callers treat the result as advisory.
    async fn list_instances(&self) -> ProviderResult<Vec<Instance>>;

    async fn get_instance(&self, instance_id: &str) -> ProviderResult<Instance>;

    async fn delete_instance(&self, instance_id: &str) -> ProviderResult<bool>;

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<bool>;

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<bool>;
}
