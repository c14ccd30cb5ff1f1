// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Tree-structured settings with lookup by dotted path.
//!
//! ```yaml
//! common:
//!   precision_type: double
//! engine:
//!   backend: wasm
//!   wasm:
//!     devices: 4
//! ```
//!
//! `settings.get_or("engine.wasm.devices", 2)` yields `4`; an absent path
//! yields the default. Settings are read when units and backends are
//! constructed, never while a tick runs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::config::consts::DEFAULT_PRECISION;
use crate::errors::ConfigError;
use crate::memory::DType;
use crate::observability::messages::validation::SettingIgnored;
use crate::observability::messages::StructuredLog;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Value);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(Self(serde_yaml::from_str(text)?))
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Mapping(map) => map.is_empty(),
            _ => false,
        }
    }

    /// The raw value at a dotted path.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.0, |node, key| node.get(key))
            .filter(|v| !v.is_null())
    }

    /// The typed value at `path`; `Ok(None)` when absent.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ConfigError> {
        self.lookup(path)
            .map(|value| {
                serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::InvalidSetting {
                    path: path.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// The typed value at `path`, or `default` when absent or mistyped.
    pub fn get_or<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        match self.get(path) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(error) => {
                SettingIgnored {
                    path,
                    error: &error,
                }
                .log();
                default
            }
        }
    }

    /// Set the value at `path`, creating intermediate tables.
    pub fn set<T: Serialize>(&mut self, path: &str, value: T) -> Result<(), ConfigError> {
        let value = serde_yaml::to_value(value)?;
        let keys: Vec<&str> = path.split('.').collect();
        let (last, parents) = keys.split_last().ok_or_else(|| ConfigError::InvalidSetting {
            path: path.to_string(),
            reason: "empty path".to_string(),
        })?;

        let mut node = &mut self.0;
        for key in parents {
            node = table(node, path)?
                .entry(Value::String(key.to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
        }
        table(node, path)?.insert(Value::String(last.to_string()), value);
        Ok(())
    }

    /// Apply a `path=value` override, parsing the value as YAML.
    pub fn apply_override(&mut self, assignment: &str) -> Result<(), ConfigError> {
        let (path, raw) = assignment
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidSetting {
                path: assignment.to_string(),
                reason: "expected path=value".to_string(),
            })?;
        let value: Value = serde_yaml::from_str(raw)?;
        self.set(path.trim(), value)
    }

    /// Element type of slots that do not declare one (`common.precision_type`).
    pub fn precision(&self) -> DType {
        let name: String = self.get_or("common.precision_type", DEFAULT_PRECISION.to_string());
        DType::from_precision(&name).unwrap_or_else(|| {
            SettingIgnored {
                path: "common.precision_type",
                error: &ConfigError::InvalidSetting {
                    path: "common.precision_type".to_string(),
                    reason: format!("unknown precision '{}'", name),
                },
            }
            .log();
            DType::F32
        })
    }

    pub fn to_json(&self) -> Result<serde_json::Value, ConfigError> {
        serde_json::to_value(&self.0).map_err(|e| ConfigError::InvalidSetting {
            path: String::new(),
            reason: e.to_string(),
        })
    }
}

fn table<'v>(node: &'v mut Value, path: &str) -> Result<&'v mut Mapping, ConfigError> {
    if node.is_null() {
        *node = Value::Mapping(Mapping::new());
    }
    node.as_mapping_mut().ok_or_else(|| ConfigError::InvalidSetting {
        path: path.to_string(),
        reason: "a parent of this path is not a table".to_string(),
    })
}
