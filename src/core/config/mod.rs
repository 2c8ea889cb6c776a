//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! cxsynth has two configuration scopes:
//! - **Global**: User-level settings
//! - **Project**: Settings of one infrastructure project
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Project config file
//! 4. CLI flags (not handled here)
//!
//! Context tables are merged key by key with the same precedence.
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$CXSYNTH_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/cxsynth/config.toml`
//! 3. `~/.cxsynth/config.toml`
//!
//! # Project Config Location
//!
//! `<project>/cxsynth.toml`
//!
//! # Example
//!
//! ```no_run
//! use cxsynth::core::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Some(Path::new("/path/to/project"))).unwrap();
//! let options = config.synth_options();
//! println!("strict: {}", options.strict);
//! println!("output: {}", config.output().display());
//! ```

pub mod schema;

pub use schema::{GlobalConfig, ProjectConfig};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::synth::SynthOptions;

/// File name of the project config.
pub const PROJECT_CONFIG_FILE: &str = "cxsynth.toml";

/// Default assembly directory, relative to the project.
pub const DEFAULT_OUTPUT: &str = "cdk.out";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence: project over global over defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Project configuration (if a project was given and has one)
    pub project: Option<ProjectConfig>,
    /// Project directory, if given
    pub(crate) project_dir: Option<PathBuf>,
    /// Path to the global config file (if loaded)
    pub(crate) global_path: Option<PathBuf>,
    /// Path to the project config file (if loaded)
    pub(crate) project_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `project_dir` is provided, also loads its `cxsynth.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or hold
    /// invalid values. Missing config files are not an error.
    pub fn load(project_dir: Option<&Path>) -> Result<Config, ConfigError> {
        let (global, global_path) = Self::load_global()?;

        let (project, project_path) = match project_dir {
            Some(dir) => {
                let path = Self::project_config_path(dir);
                if path.exists() {
                    (Some(read_config::<ProjectConfig>(&path)?), Some(path))
                } else {
                    (None, None)
                }
            }
            None => (None, None),
        };

        global.validate()?;
        if let Some(ref p) = project {
            p.validate()?;
        }

        Ok(Config {
            global,
            project,
            project_dir: project_dir.map(Path::to_path_buf),
            global_path,
            project_path,
        })
    }

    /// Load global configuration from standard locations.
    fn load_global() -> Result<(GlobalConfig, Option<PathBuf>), ConfigError> {
        if let Ok(path) = std::env::var("CXSYNTH_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok((read_config(&path)?, Some(path)));
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("cxsynth/config.toml");
            if path.exists() {
                return Ok((read_config(&path)?, Some(path)));
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".cxsynth/config.toml");
            if path.exists() {
                return Ok((read_config(&path)?, Some(path)));
            }
        }

        Ok((GlobalConfig::default(), None))
    }

    /// Get the path of a project's config file.
    pub fn project_config_path(project_dir: &Path) -> PathBuf {
        project_dir.join(PROJECT_CONFIG_FILE)
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    fn pick<T: Copy>(
        &self,
        project: impl Fn(&ProjectConfig) -> Option<T>,
        global: impl Fn(&GlobalConfig) -> Option<T>,
    ) -> Option<T> {
        self.project
            .as_ref()
            .and_then(project)
            .or_else(|| global(&self.global))
    }

    /// Synthesis options with precedence applied.
    pub fn synth_options(&self) -> SynthOptions {
        let defaults = SynthOptions::default();
        SynthOptions {
            strict: self
                .pick(|p| p.strict, |g| g.strict)
                .unwrap_or(defaults.strict),
            version_reporting: self
                .pick(|p| p.version_reporting, |g| g.version_reporting)
                .unwrap_or(defaults.version_reporting),
            tree_metadata: self
                .pick(|p| p.tree_metadata, |g| g.tree_metadata)
                .unwrap_or(defaults.tree_metadata),
            path_metadata: self
                .pick(|p| p.path_metadata, |g| g.path_metadata)
                .unwrap_or(defaults.path_metadata),
            max_token_reductions: self
                .pick(|p| p.max_token_reductions, |g| g.max_token_reductions)
                .unwrap_or(defaults.max_token_reductions),
            max_aspect_passes: self
                .pick(|p| p.max_aspect_passes, |g| g.max_aspect_passes)
                .unwrap_or(defaults.max_aspect_passes),
        }
    }

    /// Whether metadata traces are disabled.
    ///
    /// Defaults to `false` if not configured.
    pub fn disable_stack_traces(&self) -> bool {
        self.pick(|p| p.disable_stack_traces, |g| g.disable_stack_traces)
            .unwrap_or(false)
    }

    /// Assembly output directory.
    ///
    /// Relative paths are taken from the project directory. Defaults to
    /// `cdk.out`.
    pub fn output(&self) -> PathBuf {
        let output = self
            .project
            .as_ref()
            .and_then(|p| p.output.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
        match &self.project_dir {
            Some(dir) if output.is_relative() => dir.join(output),
            _ => output,
        }
    }

    /// Context to seed into the root node, project entries winning.
    pub fn context(&self) -> Result<BTreeMap<String, Value>, ConfigError> {
        let mut merged = BTreeMap::new();
        let project = self.project.iter().flat_map(|p| p.context.iter());
        for (key, value) in self.global.context.iter().chain(project) {
            let value = serde_json::to_value(value).map_err(|e| {
                ConfigError::InvalidValue(format!("context value '{key}': {e}"))
            })?;
            merged.insert(key.clone(), value);
        }
        Ok(merged)
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded project config file.
    pub fn project_config_loaded_from(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }
}

fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
