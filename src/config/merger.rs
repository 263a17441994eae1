// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use super::types::{AppConfig, ResolvedConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub projects_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub max_rounds: Option<usize>,
    pub bind: Option<String>,
}

pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (./codeweave.json)
/// 3. Global config (~/.codeweave/config.json)
/// 4. Default values
///
/// An API key still missing afterwards falls back to `OPENAI_API_KEY`.
pub fn merge_config(global: Option<AppConfig>, local: Option<AppConfig>, cli: CliOptions) -> ResolvedConfig {
    let mut result = default_config();

    if let Some(config) = global {
        apply_app_config(&mut result, &config);
    }

    if let Some(config) = local {
        apply_app_config(&mut result, &config);
    }

    apply_cli_options(&mut result, &cli);

    if result.api_key.is_none() {
        result.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
    }

    result
}

fn apply_app_config(result: &mut ResolvedConfig, config: &AppConfig) {
    if let Some(ref dir) = config.projects_dir {
        result.projects_dir = PathBuf::from(dir);
    }

    if let Some(ref path) = config.database_path {
        result.database_path = PathBuf::from(path);
    }

    if let Some(ref provider) = config.provider {
        result.provider = provider.clone();
    }

    if config.model.is_some() {
        result.model = config.model.clone();
    }

    if config.base_url.is_some() {
        result.base_url = config.base_url.clone();
    }

    if config.api_key.is_some() {
        result.api_key = config.api_key.clone();
    }

    if config.temperature.is_some() {
        result.temperature = config.temperature;
    }

    if let Some(rounds) = config.max_rounds {
        result.max_rounds = rounds.max(1);
    }

    if let Some(limit) = config.page_limit {
        result.page_limit = limit.max(1);
    }

    if let Some(timeout) = config.command_timeout_ms {
        result.command_timeout_ms = timeout;
    }

    if let Some(ref patterns) = config.blocked_commands {
        for pattern in patterns {
            if !result.blocked_commands.contains(pattern) {
                result.blocked_commands.push(pattern.clone());
            }
        }
    }

    // Keyword lists replace rather than extend, so a config can narrow them.
    if let Some(ref routing) = config.routing {
        if let Some(ref words) = routing.direct_keywords {
            result.routing.direct_keywords = words.clone();
        }
        if let Some(ref words) = routing.plan_keywords {
            result.routing.plan_keywords = words.clone();
        }
    }

    if let Some(ref snapshot) = config.snapshot {
        if let Some(max_files) = snapshot.max_files {
            result.snapshot_max_files = max_files;
        }
        if let Some(chars) = snapshot.preview_chars {
            result.snapshot_preview_chars = chars;
        }
    }

    if let Some(ref web_search) = config.web_search {
        if let Some(ref endpoint) = web_search.endpoint {
            result.web_search_endpoint = endpoint.clone();
        }
        if let Some(max) = web_search.max_results {
            result.web_search_max_results = max;
        }
    }

    if let Some(bind) = config.server.as_ref().and_then(|s| s.bind.clone()) {
        result.bind = bind;
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ref provider) = cli.provider {
        result.provider = provider.clone();
    }

    if cli.model.is_some() {
        result.model = cli.model.clone();
    }

    if cli.base_url.is_some() {
        result.base_url = cli.base_url.clone();
    }

    if cli.api_key.is_some() {
        result.api_key = cli.api_key.clone();
    }

    if let Some(ref dir) = cli.projects_dir {
        result.projects_dir = dir.clone();
    }

    if let Some(ref path) = cli.database_path {
        result.database_path = path.clone();
    }

    if let Some(rounds) = cli.max_rounds {
        result.max_rounds = rounds.max(1);
    }

    if let Some(ref bind) = cli.bind {
        result.bind = bind.clone();
    }
}
