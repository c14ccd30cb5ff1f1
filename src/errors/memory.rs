// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::errors::BackendError;
use crate::memory::{BufferId, DType, Shape};

/// Errors raised by buffer mapping and synchronization.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("{buffer} ('{name}') has shape {actual}, expected {expected}")]
    ShapeMismatch {
        buffer: BufferId,
        name: String,
        expected: Shape,
        actual: Shape,
    },

    #[error("{buffer} ('{name}') holds {actual} elements, mapped as {requested}")]
    DTypeMismatch {
        buffer: BufferId,
        name: String,
        actual: DType,
        requested: DType,
    },

    #[error("{buffer} ('{name}') cannot be placed on '{backend}': backend holds no device memory")]
    BackendUnavailable {
        buffer: BufferId,
        name: String,
        backend: String,
    },

    #[error("{buffer} ('{name}') is not owned by unit '{unit}'")]
    NotOwned {
        buffer: BufferId,
        name: String,
        unit: String,
    },

    #[error("{buffer} is passed more than once to {context}")]
    AliasedBuffer { buffer: BufferId, context: String },

    #[error("{buffer} ('{name}') holds {len} elements but kernel '{kernel}' was launched over {work_size}")]
    WorkSizeExceeded {
        buffer: BufferId,
        name: String,
        kernel: String,
        work_size: usize,
        len: usize,
    },

    #[error("{0} does not exist in this workflow")]
    UnknownBuffer(BufferId),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
