//! Application and pipeline configuration for docweave.
//!
//! User config lives at `~/.docweave/docweave.toml`. Pipeline files declare the
//! ordered component list; pipeline settings override user defaults.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DocweaveError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docweave.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docweave";

// ---------------------------------------------------------------------------
// User config (matching docweave.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default output directory for the `save` component.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Resident document budget for indexed caches that don't set one.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Process topics in parallel.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            cache_size: default_cache_size(),
            parallel: true,
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_cache_size() -> usize {
    100
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Pipeline config (one file per documentation build)
// ---------------------------------------------------------------------------

/// A pipeline definition: build settings plus the ordered component list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub build: BuildSettings,

    /// Declaration order is execution order.
    #[serde(default)]
    pub components: Vec<ComponentDeclaration>,
}

/// `[build]` section of a pipeline file. Unset values fall back to user defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    /// Restore a topic's document when a component fails part way through it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_failed_components: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<usize>,
}

/// `[[components]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDeclaration {
    /// Registered component type name.
    #[serde(rename = "type")]
    pub kind: String,

    /// Name used in logs and reports; defaults to the type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Opaque configuration block handed to the component.
    #[serde(default)]
    pub config: toml::Table,
}

impl ComponentDeclaration {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            config: toml::Table::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }

    pub fn component_config(&self) -> ComponentConfig {
        ComponentConfig::new(self.config.clone())
    }
}

impl PipelineConfig {
    /// Check structural problems that would make the pipeline unusable.
    pub fn validate(&self) -> Result<()> {
        if self.components.is_empty() {
            return Err(DocweaveError::validation(
                "pipeline declares no components",
            ));
        }
        for (i, decl) in self.components.iter().enumerate() {
            if decl.kind.trim().is_empty() {
                return Err(DocweaveError::config(format!(
                    "component #{} has an empty type",
                    i + 1
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Component config bag
// ---------------------------------------------------------------------------

/// The opaque configuration block of one component declaration.
///
/// The engine never looks inside; each component parses it into its own
/// serde type with [`ComponentConfig::parse`].
#[derive(Debug, Clone, Default)]
pub struct ComponentConfig {
    table: toml::Table,
}

impl ComponentConfig {
    pub fn new(table: toml::Table) -> Self {
        Self { table }
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &toml::Table {
        &self.table
    }

    /// Deserialize the block into a component-specific config type.
    pub fn parse<T: DeserializeOwned>(&self, component: &str) -> Result<T> {
        toml::Value::Table(self.table.clone())
            .try_into()
            .map_err(|e| {
                DocweaveError::config(format!(
                    "invalid configuration for component '{component}': {e}"
                ))
            })
    }
}

impl From<toml::Table> for ComponentConfig {
    fn from(table: toml::Table) -> Self {
        Self::new(table)
    }
}

// ---------------------------------------------------------------------------
// Engine settings (runtime, merged from user config + pipeline file)
// ---------------------------------------------------------------------------

/// Runtime engine settings, merged from the user config and pipeline `[build]`.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub parallel: bool,
    pub rollback_failed_components: bool,
    pub default_cache_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            parallel: config.defaults.parallel,
            rollback_failed_components: true,
            default_cache_size: config.defaults.cache_size,
        }
    }
}

impl EngineSettings {
    /// Apply the overrides declared in a pipeline file.
    pub fn with_build_settings(mut self, build: &BuildSettings) -> Self {
        if let Some(parallel) = build.parallel {
            self.parallel = parallel;
        }
        if let Some(rollback) = build.rollback_failed_components {
            self.rollback_failed_components = rollback;
        }
        if let Some(size) = build.cache_size {
            self.default_cache_size = size;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docweave/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocweaveError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docweave/docweave.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocweaveError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        DocweaveError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Load and validate a pipeline file.
pub fn load_pipeline(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocweaveError::io(path, e))?;

    let pipeline: PipelineConfig = toml::from_str(&content).map_err(|e| {
        DocweaveError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    pipeline.validate()?;

    tracing::debug!(
        ?path,
        components = pipeline.components.len(),
        "pipeline loaded"
    );
    Ok(pipeline)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocweaveError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocweaveError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocweaveError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
