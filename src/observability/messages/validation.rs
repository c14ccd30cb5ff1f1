// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for configuration validation warnings and errors.
//!
//! This module contains message types for logging events related to:
//! * Link graph validation
//! * Cyclic dependency detection
//! * Unresolved and malformed link detection
//! * Duplicate unit ID detection

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Cyclic dependency detected in configuration.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use veles_core::observability::messages::validation::CyclicDependencyDetected;
///
/// let cycle = vec!["a", "b", "a"];
/// let msg = CyclicDependencyDetected {
///     cycle: &cycle,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct CyclicDependencyDetected<'a> {
    pub cycle: &'a [&'a str],
}

impl Display for CyclicDependencyDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cyclic dependency detected: {}", self.cycle.join(" -> "))
    }
}

impl StructuredLog for CyclicDependencyDetected<'_> {
    fn log(&self) {
        tracing::error!(
            cycle = self.cycle.join(" -> "),
            cycle_length = self.cycle.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            cycle = self.cycle.join(" -> "),
            cycle_length = self.cycle.len(),
        )
    }
}

/// A unit input links to a unit that is not declared.
///
/// # Log Level
/// `error!` - Configuration error
pub struct UnresolvedLink<'a> {
    pub unit_id: &'a str,
    pub slot: &'a str,
    pub missing_unit: &'a str,
}

impl Display for UnresolvedLink<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Unit '{}' links input '{}' to missing unit '{}'",
            self.unit_id, self.slot, self.missing_unit
        )
    }
}

impl StructuredLog for UnresolvedLink<'_> {
    fn log(&self) {
        tracing::error!(
            unit_id = self.unit_id,
            slot = self.slot,
            missing_unit = self.missing_unit,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "validation",
            span_name = name,
            unit_id = self.unit_id,
            missing_unit = self.missing_unit,
        )
    }
}

/// Duplicate unit ID found.
///
/// # Log Level
/// `error!` - Configuration error
pub struct DuplicateUnitId<'a> {
    pub unit_id: &'a str,
}

impl Display for DuplicateUnitId<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Duplicate unit ID: '{}'", self.unit_id)
    }
}

impl StructuredLog for DuplicateUnitId<'_> {
    fn log(&self) {
        tracing::error!(unit_id = self.unit_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("validation", span_name = name, unit_id = self.unit_id)
    }
}

/// Validation started.
///
/// # Log Level
/// `debug!`
pub struct ValidationStarted {
    pub unit_count: usize,
}

impl Display for ValidationStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Validating workflow configuration with {} units", self.unit_count)
    }
}

impl StructuredLog for ValidationStarted {
    fn log(&self) {
        tracing::debug!(unit_count = self.unit_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("validation", span_name = name, unit_count = self.unit_count)
    }
}

/// Validation failed with one or more errors.
///
/// # Log Level
/// `error!`
pub struct ValidationFailed {
    pub error_count: usize,
}

impl Display for ValidationFailed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Configuration validation failed with {} errors", self.error_count)
    }
}

impl StructuredLog for ValidationFailed {
    fn log(&self) {
        tracing::error!(error_count = self.error_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("validation", span_name = name, error_count = self.error_count)
    }
}

/// A setting was present but unusable; the default applies.
///
/// # Log Level
/// `warn!` - Configuration mistake that does not stop execution
pub struct SettingIgnored<'a> {
    pub path: &'a str,
    pub error: &'a crate::errors::ConfigError,
}

impl Display for SettingIgnored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Ignoring setting '{}', using default: {}", self.path, self.error)
    }
}

impl StructuredLog for SettingIgnored<'_> {
    fn log(&self) {
        tracing::warn!(path = self.path, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("settings", span_name = name, path = self.path)
    }
}
