// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during workflow configuration validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A circular dependency was detected in the unit graph
    CyclicDependency {
        /// The cycle path showing the circular dependency
        cycle: Vec<String>,
    },
    /// A unit links an input to a unit that doesn't exist
    UnresolvedLink {
        /// The unit that declares the link
        unit_id: String,
        /// The input slot being linked
        slot: String,
        /// The producer that couldn't be resolved
        missing_unit: String,
    },
    /// A link reference is not of the form `unit.slot`
    MalformedLink {
        unit_id: String,
        slot: String,
        reference: String,
    },
    /// A unit has a duplicate ID
    DuplicateUnitId {
        /// The duplicate unit ID
        unit_id: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::CyclicDependency { cycle } => {
                write!(f, "Cyclic dependency detected: {}", cycle.join(" -> "))
            }
            ValidationError::UnresolvedLink {
                unit_id,
                slot,
                missing_unit,
            } => {
                write!(
                    f,
                    "Unit '{}' links input '{}' to '{}' which does not exist",
                    unit_id, slot, missing_unit
                )
            }
            ValidationError::MalformedLink {
                unit_id,
                slot,
                reference,
            } => {
                write!(
                    f,
                    "Unit '{}' input '{}' has malformed link '{}' (expected 'unit.slot')",
                    unit_id, slot, reference
                )
            }
            ValidationError::DuplicateUnitId { unit_id } => {
                write!(f, "Duplicate unit ID: '{}'", unit_id)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised while loading a workflow description from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported config format '{extension}' (expected yaml, yml or toml)")]
    UnsupportedFormat { extension: String },

    #[error("configuration validation failed:\n{}", format_validation(.0))]
    Invalid(Vec<ValidationError>),

    #[error("setting '{path}' has the wrong type: {reason}")]
    InvalidSetting { path: String, reason: String },
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
