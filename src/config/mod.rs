// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for codeweave.
//!
//! Handles loading and merging configuration from multiple sources:
//! - Global config: ~/.codeweave/config.json
//! - Local config: codeweave.json, codeweave.yaml, or .codeweave/config.json
//!   in the working directory
//! - CLI options and environment variables
//!
//! Configuration is merged with precedence (CLI > local > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    get_global_config_dir, get_global_config_path, load_config_file, load_global_config,
    load_local_config, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{
    AppConfig, ResolvedConfig, ResolvedRouting, RoutingConfig, ServerConfig, SnapshotConfig,
    WebSearchConfig, DEFAULT_BIND, DEFAULT_MAX_ROUNDS, DEFAULT_PREVIEW_CHARS,
    DEFAULT_SNAPSHOT_MAX_FILES,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for `dir`.
pub fn load_config(dir: &Path, cli_options: CliOptions) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let local = load_local_config(dir)?.map(|(_, config)| config);

    Ok(merge_config(global, local, cli_options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_no_files() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), CliOptions::default()).unwrap();
        assert!(!config.provider.is_empty());
        assert!(config.max_rounds >= 1);
    }

    #[test]
    fn test_load_config_cli_override() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("codeweave.json"), r#"{"provider": "ollama"}"#).unwrap();

        let cli = CliOptions {
            provider: Some("openai-compatible".to_string()),
            ..Default::default()
        };

        let config = load_config(temp.path(), cli).unwrap();
        assert_eq!(config.provider, "openai-compatible");
    }
}
