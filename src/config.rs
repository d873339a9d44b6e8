//! Layered harness configuration.
//!
//! Sources are merged in order: built-in defaults, an optional YAML file, then
//! `SWTK__*` environment variables (`SWTK__CHROME__HEADLESS=false`,
//! `SWTK__NAVIGATION__RESPONSE_TIMEOUT_MS=2000`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cdp_adapter::{CdpConfig, ClientConfig};
use config::{Config, Environment, File, FileFormat};
use frame_nav::NavConfig;
use serde::{Deserialize, Serialize};
use sw_lifecycle::LifecycleConfig;
use tracing::debug;

const ENV_PREFIX: &str = "SWTK";
const FILE_NAME: &str = "swtk.yaml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub chrome: CdpConfig,
    pub navigation: NavConfig,
    pub lifecycle: LifecycleConfig,
    pub log_level: String,
    /// Fixture server root that relative navigation targets resolve against.
    pub root_url: String,
    pub audit_transitions: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            chrome: CdpConfig::default(),
            navigation: client.navigation,
            lifecycle: client.lifecycle,
            log_level: "info".to_string(),
            root_url: client.root_url,
            audit_transitions: client.audit_transitions,
        }
    }
}

impl HarnessConfig {
    /// Load from `path` if given, else from the first default location that exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`HarnessConfig::load`], reading overrides from `env` instead of the process
    /// environment when provided.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let defaults =
            Config::try_from(&Self::default()).context("serializing default configuration")?;
        let mut builder = Config::builder().add_source(defaults);

        match path {
            Some(path) => {
                builder = builder.add_source(
                    File::from(path.to_path_buf())
                        .format(FileFormat::Yaml)
                        .required(true),
                );
            }
            None => {
                if let Some(found) = default_locations().into_iter().find(|p| p.exists()) {
                    debug!(path = %found.display(), "using configuration file");
                    builder = builder
                        .add_source(File::from(found).format(FileFormat::Yaml).required(false));
                }
            }
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env);

        builder
            .add_source(environment)
            .build()
            .context("merging configuration sources")?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Settings handed to every tab client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            root_url: self.root_url.clone(),
            navigation: self.navigation.clone(),
            lifecycle: self.lifecycle.clone(),
            audit_transitions: self.audit_transitions,
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serializing configuration")
    }
}

/// `./config/swtk.yaml`, then `<config_dir>/swtk/swtk.yaml`.
pub fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from("config").join(FILE_NAME)];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("swtk");
        dir.push(FILE_NAME);
        locations.push(dir);
    }
    locations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_carries_harness_sections() {
        let mut cfg = HarnessConfig::default();
        cfg.root_url = "http://127.0.0.1:9000".to_string();
        cfg.navigation.response_timeout_ms = 1_500;
        cfg.audit_transitions = false;

        let client = cfg.client_config();
        assert_eq!(client.root_url, "http://127.0.0.1:9000");
        assert_eq!(client.navigation.response_timeout_ms, 1_500);
        assert!(!client.audit_transitions);
    }

    #[test]
    fn default_locations_prefer_the_working_directory() {
        let locations = default_locations();
        assert_eq!(locations[0], PathBuf::from("config/swtk.yaml"));
    }
}
