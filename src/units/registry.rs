// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::UnitError;
use crate::traits::{BackendRequest, Unit};
use crate::units::{AddUnit, ScaleUnit, SourceUnit, SumUnit};

/// Builds a unit from its options.
pub type UnitFactory = Arc<dyn Fn(&UnitOptions) -> Result<Box<dyn Unit>, UnitError> + Send + Sync>;

/// Per-unit options from a workflow description, plus the backend the
/// description asked for.
#[derive(Debug, Clone, Default)]
pub struct UnitOptions {
    values: serde_yaml::Value,
    backend: Option<BackendRequest>,
}

impl UnitOptions {
    pub fn new(values: serde_yaml::Value) -> Self {
        Self {
            values,
            backend: None,
        }
    }

    pub fn with_backend(mut self, backend: BackendRequest) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn backend(&self) -> Option<&BackendRequest> {
        self.backend.as_ref()
    }

    /// Deserialize the options into a unit's config struct. Absent options
    /// deserialize like an empty mapping.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, UnitError> {
        let values = if self.values.is_null() {
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        } else {
            self.values.clone()
        };
        serde_yaml::from_value(values).map_err(|e| UnitError::invalid_option("options", e.to_string()))
    }
}

/// Unit type name → factory.
pub struct UnitRegistry {
    factories: BTreeMap<String, UnitFactory>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding `source`, `scale`, `add` and `sum`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SourceUnit::TYPE_NAME, |options| {
            Ok(Box::new(SourceUnit::from_options(options)?) as Box<dyn Unit>)
        });
        registry.register(ScaleUnit::TYPE_NAME, |options| {
            Ok(Box::new(ScaleUnit::from_options(options)?) as Box<dyn Unit>)
        });
        registry.register(AddUnit::TYPE_NAME, |options| {
            Ok(Box::new(AddUnit::from_options(options)?) as Box<dyn Unit>)
        });
        registry.register(SumUnit::TYPE_NAME, |options| {
            Ok(Box::new(SumUnit::from_options(options)?) as Box<dyn Unit>)
        });
        registry
    }

    /// Register `factory` under `type_name`, replacing any previous one.
    pub fn register<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&UnitOptions) -> Result<Box<dyn Unit>, UnitError> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.to_string(), Arc::new(factory));
    }

    pub fn create(&self, type_name: &str, options: &UnitOptions) -> Result<Box<dyn Unit>, UnitError> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| UnitError::UnknownType(type_name.to_string()))?;
        factory(options)
    }

    /// Registered type names, sorted.
    pub fn available(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn is_available(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
