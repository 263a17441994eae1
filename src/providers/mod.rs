// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model provider implementations.
//!
//! - [`openai::OpenAIProvider`] - OpenAI, Ollama, and OpenAI-compatible APIs
//! - [`replay::ReplayProvider`] - scripted responses, no network
//!
//! ```rust,ignore
//! use codeweave::providers::{create_provider, ProviderType};
//! use codeweave::types::ProviderConfig;
//!
//! let config = ProviderConfig::new("your-api-key", "gpt-4o");
//! let provider = create_provider(ProviderType::OpenAI, config)?;
//! ```

pub mod openai;
pub mod replay;

pub use openai::OpenAIProvider;
pub use replay::{ReplayCall, ReplayProvider};

use std::sync::Arc;

use crate::config::ResolvedConfig;
use crate::error::ProviderError;
use crate::types::{ProviderConfig, SharedProvider};

/// Supported provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// OpenAI GPT models
    OpenAI,
    /// Ollama local models
    Ollama,
    /// Any OpenAI-compatible API
    OpenAICompatible,
}

impl ProviderType {
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI | Self::OpenAICompatible => "gpt-4o",
            Self::Ollama => "llama3.2",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAI | Self::OpenAICompatible => openai::OPENAI_BASE_URL,
            Self::Ollama => openai::OLLAMA_BASE_URL,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI)
    }
}

/// Error type for parsing a provider type from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseProviderTypeError;

impl std::fmt::Display for ParseProviderTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid provider type")
    }
}

impl std::error::Error for ParseProviderTypeError {}

impl std::str::FromStr for ProviderType {
    type Err = ParseProviderTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "gpt" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "openai-compatible" | "openai_compatible" => Ok(Self::OpenAICompatible),
            _ => Err(ParseProviderTypeError),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "OpenAI"),
            Self::Ollama => write!(f, "Ollama"),
            Self::OpenAICompatible => write!(f, "OpenAI-Compatible"),
        }
    }
}

/// Create a provider instance from type and configuration.
///
/// # Errors
///
/// Returns [`ProviderError::NotConfigured`] when OpenAI has no API key or an
/// OpenAI-compatible provider has no base URL.
pub fn create_provider(provider_type: ProviderType, config: ProviderConfig) -> Result<SharedProvider, ProviderError> {
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| provider_type.default_model().to_string());

    match provider_type {
        ProviderType::OpenAI => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("API key required for OpenAI".to_string()))?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| provider_type.default_base_url().to_string());

            Ok(Arc::new(OpenAIProvider::new(Some(api_key), model, base_url, config)))
        }
        ProviderType::Ollama => {
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| provider_type.default_base_url().to_string());

            Ok(Arc::new(OpenAIProvider::new(None, model, base_url, config)))
        }
        ProviderType::OpenAICompatible => {
            let base_url = config.base_url.clone().ok_or_else(|| {
                ProviderError::NotConfigured("base_url required for OpenAI-Compatible".to_string())
            })?;

            Ok(Arc::new(OpenAIProvider::new(config.api_key.clone(), model, base_url, config)))
        }
    }
}

/// Create the provider named by a resolved configuration.
pub fn create_provider_from_config(config: &ResolvedConfig) -> Result<SharedProvider, ProviderError> {
    let provider_type: ProviderType = config
        .provider
        .parse()
        .map_err(|_| ProviderError::NotConfigured(format!("Unknown provider: {}", config.provider)))?;

    create_provider(
        provider_type,
        ProviderConfig {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            ..Default::default()
        },
    )
}
