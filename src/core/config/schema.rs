//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$CXSYNTH_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/cxsynth/config.toml`
//! 3. `~/.cxsynth/config.toml`
//!
//! # Project Config
//!
//! Located at `<project>/cxsynth.toml`.
//!
//! # Validation
//!
//! Bounds are validated after parsing; both must be at least 1.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// strict = false
/// version_reporting = true
/// max_token_reductions = 20
///
/// [context]
/// "@aws-cdk/core:newStyleStackSynthesis" = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Treat warnings as errors
    pub strict: Option<bool>,

    /// Report the library version in the manifest
    pub version_reporting: Option<bool>,

    /// Write tree.json
    pub tree_metadata: Option<bool>,

    /// Add aws:cdk:path metadata to resources
    pub path_metadata: Option<bool>,

    /// Omit traces from metadata entries
    pub disable_stack_traces: Option<bool>,

    /// Bound on nested token reductions
    pub max_token_reductions: Option<usize>,

    /// Bound on aspect passes
    pub max_aspect_passes: Option<usize>,

    /// Context seeded into the root node
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, toml::Value>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bound("max_token_reductions", self.max_token_reductions)?;
        validate_bound("max_aspect_passes", self.max_aspect_passes)
    }
}

/// Project configuration.
///
/// # Example
///
/// ```toml
/// output = "cdk.out"
/// strict = true
///
/// [context]
/// stage = "prod"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Assembly output directory, relative to the project
    pub output: Option<PathBuf>,

    pub strict: Option<bool>,
    pub version_reporting: Option<bool>,
    pub tree_metadata: Option<bool>,
    pub path_metadata: Option<bool>,
    pub disable_stack_traces: Option<bool>,
    pub max_token_reductions: Option<usize>,
    pub max_aspect_passes: Option<usize>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, toml::Value>,
}

impl ProjectConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(output) = &self.output {
            if output.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "output cannot be empty".to_string(),
                ));
            }
        }
        validate_bound("max_token_reductions", self.max_token_reductions)?;
        validate_bound("max_aspect_passes", self.max_aspect_passes)
    }
}

fn validate_bound(name: &str, value: Option<usize>) -> Result<(), ConfigError> {
    match value {
        Some(0) => Err(ConfigError::InvalidValue(format!(
            "{name} must be at least 1"
        ))),
        _ => Ok(()),
    }
}
