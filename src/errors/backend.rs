// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types for backend operations.
//!
//! Every variant names the backend (`kind:index`) or kernel involved so a
//! failure can be traced back to the device that produced it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    /// No factory is registered for the kind, or the factory refused the device index.
    #[error("backend '{kind}:{index}' is unavailable: {reason}")]
    Unavailable {
        kind: String,
        index: usize,
        reason: String,
    },

    /// Kernel source failed to build. Carries the full source for diagnostics.
    #[error("failed to compile kernel '{kernel}' on '{backend}': {diagnostics}")]
    Compile {
        backend: String,
        kernel: String,
        source_text: String,
        diagnostics: String,
    },

    /// Kernel trapped or was invoked with arguments it does not accept.
    #[error("kernel '{kernel}' failed on '{backend}': {reason}")]
    Launch {
        backend: String,
        kernel: String,
        reason: String,
    },

    /// The device memory pool cannot satisfy an allocation.
    #[error("backend '{backend}' is out of device memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        backend: String,
        requested: usize,
        available: usize,
    },

    /// Host/device copy failed.
    #[error("transfer on '{backend}' failed: {reason}")]
    Transfer { backend: String, reason: String },

    /// A kernel handle that does not belong to this backend.
    #[error("kernel handle '{kernel}' is not valid on '{backend}'")]
    InvalidKernel { backend: String, kernel: String },
}

impl BackendError {
    pub fn unavailable(kind: &str, index: usize, reason: impl Into<String>) -> Self {
        BackendError::Unavailable {
            kind: kind.to_string(),
            index,
            reason: reason.into(),
        }
    }
}
