// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for workflow construction, initialization and execution.

use thiserror::Error;

use crate::engine::WorkflowState;
use crate::errors::{BackendError, MemoryError, UnitError};
use crate::memory::{DType, Shape};

#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Producer and consumer disagree on element type.
    #[error("cannot link {source_unit}.{source_slot} ({actual}) to {unit}.{slot} ({expected})")]
    LinkTypeError {
        unit: String,
        slot: String,
        source_unit: String,
        source_slot: String,
        expected: DType,
        actual: DType,
    },

    /// Producer and consumer disagree on shape.
    #[error("shape mismatch on {unit}.{slot}: expected {expected}, got {actual} from '{producer}'")]
    ShapeMismatch {
        unit: String,
        slot: String,
        producer: String,
        expected: Shape,
        actual: Shape,
    },

    #[error("unknown unit '{name}'")]
    UnknownUnit { name: String },

    #[error("unit '{unit}' has no slot '{slot}'")]
    UnknownSlot { unit: String, slot: String },

    #[error("input '{slot}' of unit '{unit}' has malformed link '{reference}' (expected 'unit.slot')")]
    MalformedLink {
        unit: String,
        slot: String,
        reference: String,
    },

    #[error("unit '{name}' is already part of the workflow")]
    DuplicateUnit { name: String },

    #[error("input '{slot}' of unit '{unit}' is not linked")]
    UnlinkedInput { unit: String, slot: String },

    #[error("cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("failed to initialize unit '{unit}': {source}")]
    Initialization {
        unit: String,
        #[source]
        source: UnitError,
    },

    #[error("unit '{unit}' failed on tick {tick}: {source}")]
    RunFailure {
        unit: String,
        tick: u64,
        #[source]
        source: UnitError,
    },

    #[error("unit '{unit}' failed to stop: {source}")]
    Teardown {
        unit: String,
        #[source]
        source: UnitError,
    },

    #[error("cannot create unit '{unit}': {source}")]
    UnitCreation {
        unit: String,
        #[source]
        source: UnitError,
    },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("workflow cancelled during tick {tick}")]
    Cancelled { tick: u64 },

    #[error("operation requires workflow state {expected}, but it is {actual:?}")]
    InvalidState {
        expected: &'static str,
        actual: WorkflowState,
    },
}

impl WorkflowError {
    pub(crate) fn initialization(unit: &str, source: impl Into<UnitError>) -> Self {
        WorkflowError::Initialization {
            unit: unit.to_string(),
            source: source.into(),
        }
    }

    /// The backend error behind an initialization or run failure, if any.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            WorkflowError::Initialization { source, .. }
            | WorkflowError::RunFailure { source, .. } => match source {
                UnitError::Backend(e) => Some(e),
                UnitError::Memory(MemoryError::Backend(e)) => Some(e),
                _ => None,
            },
            _ => None,
        }
    }
}
