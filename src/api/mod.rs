// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/api/mod.rs - HTTP transport shared by provider integrations

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiClientBuilder, AuthMethod};
pub use error::{ApiError, ApiResult};
