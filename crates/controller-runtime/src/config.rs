//! # Controller Configuration
//!
//! [`ControllerConfig`] is read once at startup (usually from TOML) and then
//! handed to every factory *by value*. Each manager owns its own clone, so no
//! tenant can observe another tenant mutating it.
//!
//! ```toml
//! account_id = "111122223333"
//! region = "us-east-1"
//! endpoint_url = "http://localhost:4566"
//! watch_namespace = "infra"
//! enable_adoption = true
//! resource_tags = ["team=platform", "services.k8s.aws/namespace=%K8S_NAMESPACE%"]
//!
//! [feature_gates]
//! ReadOnlyResources = true
//! ```

use crate::identifiers::{AccountId, Region};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub account_id: AccountId,
    pub region: Region,
    /// Overrides the session's endpoint for every manager.
    pub endpoint_url: Option<String>,
    /// CRs elsewhere are skipped. Empty means all namespaces.
    pub watch_namespace: Option<String>,
    /// `key=value` templates; see [`crate::tags`].
    pub resource_tags: Vec<String>,
    pub enable_adoption: bool,
    pub requeue_unresolved_seconds: u64,
    pub initial_backoff_seconds: u64,
    pub max_backoff_seconds: u64,
    /// Named switches, e.g. `ReadOnlyResources`.
    pub feature_gates: BTreeMap<String, bool>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            account_id: AccountId(String::new()),
            region: Region::from("us-east-1"),
            endpoint_url: None,
            watch_namespace: None,
            resource_tags: vec![
                "services.k8s.aws/controller-version=%CONTROLLER_SERVICE%-%CONTROLLER_VERSION%"
                    .to_string(),
                "services.k8s.aws/namespace=%K8S_NAMESPACE%".to_string(),
            ],
            enable_adoption: false,
            requeue_unresolved_seconds: 5,
            initial_backoff_seconds: 1,
            max_backoff_seconds: 300,
            feature_gates: BTreeMap::new(),
        }
    }
}

impl ControllerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account_id.0.is_empty() {
            return Err(ConfigError::Invalid("account_id is required".into()));
        }
        if self.region.0.trim().is_empty() {
            return Err(ConfigError::Invalid("region is required".into()));
        }
        if self.initial_backoff_seconds == 0 {
            return Err(ConfigError::Invalid(
                "initial_backoff_seconds must be positive".into(),
            ));
        }
        if self.max_backoff_seconds < self.initial_backoff_seconds {
            return Err(ConfigError::Invalid(
                "max_backoff_seconds must not be below initial_backoff_seconds".into(),
            ));
        }
        if let Some(bad) = self.resource_tags.iter().find(|t| !t.contains('=')) {
            return Err(ConfigError::Invalid(format!(
                "resource tag '{bad}' is not of the form key=value"
            )));
        }
        Ok(())
    }

    pub fn feature_enabled(&self, gate: &str) -> bool {
        self.feature_gates.get(gate).copied().unwrap_or(false)
    }

    pub fn requeue_unresolved(&self) -> Duration {
        Duration::from_secs(self.requeue_unresolved_seconds)
    }

    /// Whether CRs in `namespace` are this controller's business.
    pub fn watches(&self, namespace: &str) -> bool {
        self.watch_namespace
            .as_deref()
            .map_or(true, |ns| ns.is_empty() || ns == namespace)
    }
}
