// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for backend registry and kernel events.
//!
//! This module contains message types for logging events related to:
//! * Backend factory registration and instance creation
//! * Kernel compilation and cache hits
//! * Kernel launches

use crate::errors::BackendError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A backend factory was registered.
///
/// # Log Level
/// `debug!` - Process setup
///
/// # Example
/// ```
/// use veles_core::observability::messages::backend::BackendRegistered;
///
/// let msg = BackendRegistered {
///     kind: "wasm",
///     replaced: false,
///     evicted: 0,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct BackendRegistered<'a> {
    pub kind: &'a str,
    pub replaced: bool,
    pub evicted: usize,
}

impl Display for BackendRegistered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.replaced {
            write!(
                f,
                "Replaced backend factory '{}' ({} cached instances evicted)",
                self.kind, self.evicted
            )
        } else {
            write!(f, "Registered backend factory '{}'", self.kind)
        }
    }
}

impl StructuredLog for BackendRegistered<'_> {
    fn log(&self) {
        tracing::debug!(
            kind = self.kind,
            replaced = self.replaced,
            evicted = self.evicted,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("backend_registry", span_name = name, kind = self.kind)
    }
}

/// A backend instance was constructed for a device.
///
/// # Log Level
/// `info!` - One per device per process
pub struct BackendCreated<'a> {
    pub kind: &'a str,
    pub index: usize,
}

impl Display for BackendCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Created backend {}:{}", self.kind, self.index)
    }
}

impl StructuredLog for BackendCreated<'_> {
    fn log(&self) {
        tracing::info!(kind = self.kind, index = self.index, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "backend",
            span_name = name,
            kind = self.kind,
            index = self.index,
        )
    }
}

/// Cached backend instances were dropped.
///
/// # Log Level
/// `debug!` - Test teardown or explicit reset
pub struct RegistryReset {
    pub evicted: usize,
}

impl Display for RegistryReset {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Backend registry reset: {} cached instances dropped", self.evicted)
    }
}

impl StructuredLog for RegistryReset {
    fn log(&self) {
        tracing::debug!(evicted = self.evicted, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("backend_registry", span_name = name)
    }
}

/// Kernel compiled and added to the cache.
///
/// # Log Level
/// `debug!` - Happens during unit initialization
pub struct KernelCompiled<'a> {
    pub backend: &'a str,
    pub kernel: &'a str,
    pub duration: Duration,
}

impl Display for KernelCompiled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Compiled kernel '{}' on {} in {:?}",
            self.kernel, self.backend, self.duration
        )
    }
}

impl StructuredLog for KernelCompiled<'_> {
    fn log(&self) {
        tracing::debug!(
            backend = self.backend,
            kernel = self.kernel,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "kernel_compile",
            span_name = name,
            backend = self.backend,
            kernel = self.kernel,
        )
    }
}

/// Kernel served from the cache.
///
/// # Log Level
/// `trace!`
pub struct KernelCacheHit<'a> {
    pub backend: &'a str,
    pub kernel: &'a str,
}

impl Display for KernelCacheHit<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Kernel '{}' on {} served from cache", self.kernel, self.backend)
    }
}

impl StructuredLog for KernelCacheHit<'_> {
    fn log(&self) {
        tracing::trace!(backend = self.backend, kernel = self.kernel, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!("kernel_compile", span_name = name, kernel = self.kernel)
    }
}

/// Kernel compilation failed.
///
/// # Log Level
/// `error!` - Aborts unit initialization
pub struct KernelCompileFailed<'a> {
    pub backend: &'a str,
    pub kernel: &'a str,
    pub error: &'a BackendError,
}

impl Display for KernelCompileFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to compile kernel '{}' on {}: {}",
            self.kernel, self.backend, self.error
        )
    }
}

impl StructuredLog for KernelCompileFailed<'_> {
    fn log(&self) {
        tracing::error!(
            backend = self.backend,
            kernel = self.kernel,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "kernel_compile",
            span_name = name,
            backend = self.backend,
            kernel = self.kernel,
        )
    }
}

/// Kernel launch finished.
///
/// # Log Level
/// `trace!` - One per launch, high volume
pub struct KernelLaunched<'a> {
    pub backend: &'a str,
    pub kernel: &'a str,
    pub work_size: usize,
    pub duration: Duration,
}

impl Display for KernelLaunched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Launched kernel '{}' on {} over {} work items in {:?}",
            self.kernel, self.backend, self.work_size, self.duration
        )
    }
}

impl StructuredLog for KernelLaunched<'_> {
    fn log(&self) {
        tracing::trace!(
            backend = self.backend,
            kernel = self.kernel,
            work_size = self.work_size,
            duration_us = self.duration.as_micros() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!(
            "kernel_launch",
            span_name = name,
            backend = self.backend,
            kernel = self.kernel,
            work_size = self.work_size,
        )
    }
}
