//! Runtime configuration.
//!
//! Defines the application package, this process's name, where the core
//! process lives and how to reach the root registry.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ipc::discovery::DiscoveryConfig;
use crate::process::{current_process_name, ProcessIdentity};

pub const ENV_PACKAGE: &str = "SVCLINK_PACKAGE";
pub const ENV_PROCESS: &str = "SVCLINK_PROCESS";
pub const ENV_CORE_SUFFIX: &str = "SVCLINK_CORE_SUFFIX";

/// Configuration for one process's service runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Application package; process names are `<package><suffix>`.
    /// Default: "app"
    pub package: String,

    /// Name of this process. Detected from the OS when unset.
    pub process_name: Option<String>,

    /// Suffix naming the core process.
    /// Default: ":core"
    pub core_suffix: String,

    /// Smallest valid numeric service id.
    /// Default: 0
    pub min_service_id: i32,

    /// Largest valid numeric service id.
    /// Default: 1023
    pub max_service_id: i32,

    pub discovery: DiscoveryConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            package: "app".to_string(),
            process_name: None,
            core_suffix: ":core".to_string(),
            min_service_id: 0,
            max_service_id: 1023,
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Configuration for `process` inside `package`, other fields default.
    pub fn for_process(package: &str, process: &str) -> Self {
        Self {
            package: package.to_string(),
            process_name: Some(process.to_string()),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Applies `SVCLINK_PACKAGE`, `SVCLINK_PROCESS` and `SVCLINK_CORE_SUFFIX`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(package) = std::env::var(ENV_PACKAGE) {
            self.package = package;
        }
        if let Ok(process) = std::env::var(ENV_PROCESS) {
            self.process_name = Some(process);
        }
        if let Ok(suffix) = std::env::var(ENV_CORE_SUFFIX) {
            self.core_suffix = suffix;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.package.is_empty() {
            return Err(Error::Config("package cannot be empty".to_string()));
        }
        if self.min_service_id > self.max_service_id {
            return Err(Error::Config(format!(
                "min_service_id {} exceeds max_service_id {}",
                self.min_service_id, self.max_service_id
            )));
        }
        if self.discovery.address.is_empty() || self.discovery.bundle_key.is_empty() {
            return Err(Error::Config(
                "discovery address and bundle key are required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn identity(&self) -> ProcessIdentity {
        let process = self
            .process_name
            .clone()
            .unwrap_or_else(current_process_name);
        ProcessIdentity::new(&self.package, &process, &self.core_suffix)
    }
}
