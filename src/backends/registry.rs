// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Backend registry: kind name → driver factory, plus one cached [`Backend`]
//! per `(kind, index)`.
//!
//! # Process-wide state
//!
//! [`BackendRegistry::global`] is created on first use and populated with
//! the built-in backends at that moment. Cached instances live until
//! [`BackendRegistry::reset`] or until a factory for their kind is replaced;
//! nothing else invalidates them.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::backends::numeric::NumericDriver;
use crate::backends::wasm::WasmDriver;
use crate::backends::{Backend, BackendId};
use crate::config::Settings;
use crate::errors::BackendError;
use crate::observability::messages::backend::{BackendCreated, BackendRegistered, RegistryReset};
use crate::observability::messages::StructuredLog;
use crate::traits::BackendDriver;

/// Builds a driver for one device index.
pub type BackendFactory = Arc<
    dyn Fn(&Settings, usize) -> Result<Box<dyn BackendDriver>, BackendError> + Send + Sync,
>;

pub const NUMERIC: &str = "numeric";
pub const WASM: &str = "wasm";

static GLOBAL: OnceLock<Arc<BackendRegistry>> = OnceLock::new();

pub struct BackendRegistry {
    settings: Settings,
    factories: RwLock<HashMap<String, BackendFactory>>,
    instances: Mutex<HashMap<(String, usize), Backend>>,
}

impl BackendRegistry {
    /// An empty registry with default settings.
    pub fn new() -> Self {
        Self::empty(Settings::default())
    }

    /// A registry holding the built-in `numeric` and `wasm` backends.
    pub fn with_builtin() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Built-in backends, with factories reading `settings`.
    pub fn with_settings(settings: Settings) -> Self {
        let registry = Self::empty(settings);
        registry.register(NUMERIC, |_, index| {
            NumericDriver::new(index).map(|d| Box::new(d) as Box<dyn BackendDriver>)
        });
        registry.register(WASM, |settings, index| {
            WasmDriver::new(settings, index).map(|d| Box::new(d) as Box<dyn BackendDriver>)
        });
        registry
    }

    fn empty(settings: Settings) -> Self {
        Self {
            settings,
            factories: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry, populated with the built-ins on first call.
    pub fn global() -> Arc<BackendRegistry> {
        GLOBAL
            .get_or_init(|| Arc::new(BackendRegistry::with_builtin()))
            .clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Register `factory` under `kind`. Re-registering replaces the factory
    /// and evicts cached instances of that kind; handles already given out
    /// stay valid.
    pub fn register<F>(&self, kind: &str, factory: F)
    where
        F: Fn(&Settings, usize) -> Result<Box<dyn BackendDriver>, BackendError>
            + Send
            + Sync
            + 'static,
    {
        let replaced = self
            .factories
            .write()
            .insert(kind.to_string(), Arc::new(factory))
            .is_some();

        let evicted = if replaced {
            let mut instances = self.instances.lock();
            let before = instances.len();
            instances.retain(|(k, _), _| k != kind);
            before - instances.len()
        } else {
            0
        };

        BackendRegistered {
            kind,
            replaced,
            evicted,
        }
        .log();
    }

    /// The backend for `(kind, index)`, constructed on first request and
    /// cached afterwards.
    pub fn create(&self, kind: &str, index: usize) -> Result<Backend, BackendError> {
        let mut instances = self.instances.lock();
        if let Some(backend) = instances.get(&(kind.to_string(), index)) {
            return Ok(backend.clone());
        }

        let factory = self
            .factories
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| BackendError::unavailable(kind, index, "no factory registered"))?;

        let driver = factory(&self.settings, index)?;
        let backend = Backend::new(driver);
        BackendCreated { kind, index }.log();

        instances.insert((kind.to_string(), index), backend.clone());
        Ok(backend)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.factories.read().contains_key(kind)
    }

    /// Ids of the instances currently cached.
    pub fn cached(&self) -> Vec<BackendId> {
        let mut ids: Vec<BackendId> = self
            .instances
            .lock()
            .values()
            .map(|b| b.id().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drop every cached instance. Returns how many were dropped.
    pub fn reset(&self) -> usize {
        let evicted = {
            let mut instances = self.instances.lock();
            let count = instances.len();
            instances.clear();
            count
        };
        RegistryReset { evicted }.log();
        evicted
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.kinds())
            .field("cached", &self.cached())
            .finish()
    }
}
