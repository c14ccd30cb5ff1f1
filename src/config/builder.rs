// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::backends::BackendRegistry;
use crate::config::loader::parse_link;
use crate::config::WorkflowConfig;
use crate::engine::Workflow;
use crate::errors::WorkflowError;
use crate::units::{UnitOptions, UnitRegistry};

/// Builds a linked [`Workflow`] from a [`WorkflowConfig`].
///
/// Units are created through a [`UnitRegistry`] and added in declaration
/// order, then every input is linked. The result is ready for
/// `initialize`.
///
/// # Examples
///
/// ```
/// use veles_core::config::{ConfigFormat, WorkflowBuilder, WorkflowConfig};
///
/// let config = WorkflowConfig::parse(
///     r#"
/// units:
///   - { id: source, type: source, options: { values: [1, 2] } }
///   - { id: total, type: sum, inputs: { input: source.output } }
/// "#,
///     ConfigFormat::Yaml,
/// )?;
/// let mut workflow = WorkflowBuilder::from_config(&config)?;
/// assert_eq!(workflow.order()?, vec!["source", "total"]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct WorkflowBuilder {
    units: UnitRegistry,
    backends: Option<Arc<BackendRegistry>>,
    forced_backend: Option<String>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            units: UnitRegistry::with_builtin(),
            backends: None,
            forced_backend: None,
        }
    }

    pub fn with_units(mut self, units: UnitRegistry) -> Self {
        self.units = units;
        self
    }

    /// Create backends from `registry` instead of one derived from the
    /// description's settings.
    pub fn with_backends(mut self, registry: Arc<BackendRegistry>) -> Self {
        self.backends = Some(registry);
        self
    }

    /// Run every device unit on `kind`.
    pub fn force_backend(mut self, kind: impl Into<String>) -> Self {
        self.forced_backend = Some(kind.into());
        self
    }

    /// Build with the built-in units and default backends.
    pub fn from_config(config: &WorkflowConfig) -> Result<Workflow, WorkflowError> {
        Self::new().build(config)
    }

    /// Without an explicit registry, descriptions with settings get a
    /// registry of their own so backend settings such as
    /// `engine.wasm.devices` apply; others share the process-wide one.
    pub fn build(&self, config: &WorkflowConfig) -> Result<Workflow, WorkflowError> {
        let registry = match &self.backends {
            Some(registry) => registry.clone(),
            None if config.settings.is_empty() => BackendRegistry::global(),
            None => Arc::new(BackendRegistry::with_settings(config.settings.clone())),
        };
        let mut workflow = Workflow::with_settings(config.settings.clone()).with_registry(registry);
        if let Some(kind) = &self.forced_backend {
            workflow = workflow.force_backend(kind.clone());
        }

        for unit in &config.units {
            let mut options = UnitOptions::new(unit.options.clone());
            if let Some(request) = unit.backend_request() {
                options = options.with_backend(request);
            }
            let created = self
                .units
                .create(&unit.unit, &options)
                .map_err(|source| WorkflowError::UnitCreation {
                    unit: unit.id.clone(),
                    source,
                })?;
            workflow.add_unit(unit.id.clone(), created)?;
        }

        for unit in &config.units {
            for (slot, reference) in &unit.inputs {
                let (producer, source_slot) =
                    parse_link(reference).ok_or_else(|| WorkflowError::MalformedLink {
                        unit: unit.id.clone(),
                        slot: slot.clone(),
                        reference: reference.clone(),
                    })?;
                workflow.link(&unit.id, slot, producer, source_slot)?;
            }
        }
        Ok(workflow)
    }
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
