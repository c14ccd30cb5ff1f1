// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::Settings;
use crate::errors::ConfigError;
use crate::traits::BackendRequest;
use crate::traits::unit::AUTO_BACKEND;

/// A workflow description: settings, an optional tick count and the units
/// with their links.
///
/// # Fields
/// * `settings` - Tree read through [`Settings`] lookups (optional)
/// * `ticks` - How many ticks the binary runs (optional, defaults to 1)
/// * `units` - Unit definitions in declaration order
///
/// # Example
/// ```yaml
/// settings:
///   common:
///     precision_type: float
///   engine:
///     backend: wasm
/// ticks: 3
/// units:
///   - id: source
///     type: source
///     options:
///       values: [1, 2, 3, 4]
///   - id: double
///     type: scale
///     backend: wasm
///     inputs:
///       input: source.output
///     options:
///       factor: 2
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

/// One unit of a workflow description.
///
/// # Fields
/// * `id` - Unique unit name within the workflow
/// * `unit` - Registered unit type (`source`, `scale`, `add`, `sum`)
/// * `backend` - Backend kind for device units (optional)
/// * `device` - Device index on that backend (optional, defaults to 0)
/// * `inputs` - Input slot → `producer.slot` references
/// * `options` - Unit-specific options
#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub unit: String,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub device: Option<usize>,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub options: serde_yaml::Value,
}

impl UnitConfig {
    /// The backend this description asks for, if any. A device index alone
    /// selects that device of the default backend kind.
    pub fn backend_request(&self) -> Option<BackendRequest> {
        match (&self.backend, self.device) {
            (Some(kind), device) => Some(BackendRequest::new(kind.clone(), device.unwrap_or(0))),
            (None, Some(device)) => Some(BackendRequest::new(AUTO_BACKEND, device)),
            (None, None) => None,
        }
    }
}

/// Split a `unit.slot` link reference. The slot is everything after the
/// last dot.
pub fn parse_link(reference: &str) -> Option<(&str, &str)> {
    reference
        .rsplit_once('.')
        .filter(|(unit, slot)| !unit.is_empty() && !slot.is_empty())
}

/// Format of a workflow description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from a file extension (`yaml`, `yml`, `toml`).
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            _ => Err(ConfigError::UnsupportedFormat { extension }),
        }
    }
}

impl WorkflowConfig {
    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        Ok(match format {
            ConfigFormat::Yaml => serde_yaml::from_str(text)?,
            ConfigFormat::Toml => toml::from_str(text)?,
        })
    }

    pub fn unit(&self, id: &str) -> Option<&UnitConfig> {
        self.units.iter().find(|u| u.id == id)
    }
}

/// Load a workflow description from a YAML or TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<WorkflowConfig, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    WorkflowConfig::parse(&content, format)
}

/// Load a workflow description and validate its link graph.
///
/// Every validation problem is reported at once in
/// [`ConfigError::Invalid`].
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<WorkflowConfig, ConfigError> {
    let cfg = load_config(path)?;
    crate::config::validate_workflow_config(&cfg).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}
