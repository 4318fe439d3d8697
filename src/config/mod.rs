//! Configuration loading for rulebook.

use std::path::PathBuf;

use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "RULEBOOK_CONFIG";

/// Top-level configuration loaded from config.toml.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Where the corpus and the persisted index live.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Passages handed to the generator per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// The chat completion service used to write answers.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_storage_dir() -> String {
    "./storage".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_top_k() -> usize {
    2
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            data_dir: default_data_dir(),
            top_k: default_top_k(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        expand_tilde(&self.storage_dir)
    }

    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        expand_tilde(&self.data_dir)
    }
}

impl Config {
    /// Load config from `$RULEBOOK_CONFIG` or ~/.config/rulebook/config.toml,
    /// or return defaults when neither file exists.
    pub fn load() -> anyhow::Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let contents = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            return Ok(config);
        }

        Ok(Config::default())
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        ProjectDirs::from("", "", "rulebook").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Expand ~ to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(base_dirs) = BaseDirs::new()
    {
        return base_dirs.home_dir().join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.index.storage_dir, "./storage");
        assert_eq!(config.index.data_dir, "./data");
        assert_eq!(config.index.top_k, 2);
        assert_eq!(config.upstream.model, "gpt-3.5-turbo");
        assert_eq!(config.upstream.timeout_secs, 60);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            "[index]\ndata_dir = \"rules\"\n\n[upstream]\nmodel = \"gpt-4o-mini\"\n",
        )
        .unwrap();

        assert_eq!(config.index.data_dir, "rules");
        assert_eq!(config.index.storage_dir, "./storage");
        assert_eq!(config.upstream.model, "gpt-4o-mini");
        assert_eq!(config.upstream.api_base, "https://api.openai.com/v1");
    }

    #[test]
    fn expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("./storage"), PathBuf::from("./storage"));
        assert_eq!(expand_tilde("/var/rules"), PathBuf::from("/var/rules"));
    }

    #[test]
    fn expand_tilde_uses_home() {
        if let Some(base_dirs) = BaseDirs::new() {
            assert_eq!(
                expand_tilde("~/rules"),
                base_dirs.home_dir().join("rules")
            );
        }
    }
}
