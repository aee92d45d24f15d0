// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/api/client.rs - Shared HTTP client for provider APIs

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::error::{ApiError, ApiResult};

const MAX_RETRY_ATTEMPTS: u32 = 3;

/// How a provider expects its credential on the wire.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Bearer(String),
    ApiKey { header: String, key: String },
    None,
}

/// JSON-over-HTTP client shared by all provider variants.
///
/// Retries rate-limited and 5xx responses with exponential backoff before
/// surfacing the error; everything else is mapped straight through
/// `ApiError::from_status`.
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: AuthMethod,
    retry_delay: Duration,
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            AuthMethod::Bearer(token) => builder.bearer_auth(token),
            AuthMethod::ApiKey { header, key } => builder.header(header, key),
            AuthMethod::None => builder,
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ApiResult<T> {
        let status = response.status();

        if status.is_success() {
            let text = response.text().await?;
            // Some provider endpoints (DELETE, power actions) return no body.
            let body = if text.is_empty() { "{}" } else { &text };
            return serde_json::from_str(body)
                .map_err(|e| ApiError::JsonParse(format!("{e}: {body}")));
        }

        let text = response.text().await.unwrap_or_default();
        let parsed: Option<Value> = serde_json::from_str(&text).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("error").or_else(|| v.get("message")))
            .and_then(|v| v.as_str())
            .unwrap_or(&text)
            .to_string();

        Err(ApiError::from_status(status.as_u16(), message))
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        params: Option<&HashMap<String, String>>,
    ) -> ApiResult<T> {
        let url = self.build_url(endpoint);
        let mut delay = self.retry_delay;

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            debug!(%method, %url, attempt, "provider API request");

            let mut builder = self.apply_auth(self.client.request(method.clone(), &url));
            if let Some(p) = params {
                builder = builder.query(p);
            }
            if let Some(b) = body {
                builder = builder.json(b);
            }

            let result = match builder.send().await {
                Ok(response) => self.handle_response(response).await,
                Err(e) => Err(ApiError::from(e)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < MAX_RETRY_ATTEMPTS - 1 => {
                    warn!(
                        %url,
                        error = %e,
                        "retryable API failure, waiting {:?} before attempt {}/{}",
                        delay,
                        attempt + 2,
                        MAX_RETRY_ATTEMPTS
                    );
                    sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!(%url, "giving up after {} attempts", MAX_RETRY_ATTEMPTS);
                    }
                    return Err(e);
                }
            }
        }

        unreachable!("retry loop always returns")
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Option<&HashMap<String, String>>,
    ) -> ApiResult<T> {
        self.request(Method::GET, endpoint, None, params).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
    ) -> ApiResult<T> {
        self.request(Method::POST, endpoint, body, None).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
    ) -> ApiResult<T> {
        self.request(Method::PUT, endpoint, body, None).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request(Method::DELETE, endpoint, None, None).await
    }
}

pub struct ApiClientBuilder {
    base_url: String,
    auth: AuthMethod,
    timeout: Duration,
    retry_delay: Duration,
}

impl ApiClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: AuthMethod::None,
            timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.auth = AuthMethod::Bearer(token.into());
        self
    }

    pub fn api_key_auth(mut self, header: impl Into<String>, key: impl Into<String>) -> Self {
        self.auth = AuthMethod::ApiKey {
            header: header.into(),
            key: key.into(),
        };
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn build(self) -> ApiResult<ApiClient> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ApiError::RequestBuild(e.to_string()))?;

        Ok(ApiClient {
            client,
            base_url: self.base_url,
            auth: self.auth,
            retry_delay: self.retry_delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let client = ApiClient::builder("https://api.example.com/v2")
            .build()
            .unwrap();

        assert_eq!(
            client.build_url("/droplets"),
            "https://api.example.com/v2/droplets"
        );
        assert_eq!(
            client.build_url("droplets"),
            "https://api.example.com/v2/droplets"
        );
    }

    #[test]
    fn test_builder_defaults() {
        let client = ApiClient::builder("https://api.example.com")
            .bearer_auth("tok")
            .build()
            .unwrap();

        assert_eq!(client.base_url(), "https://api.example.com");
        assert!(matches!(client.auth, AuthMethod::Bearer(_)));
    }
}
