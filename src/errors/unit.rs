// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;
use thiserror::Error;

use crate::errors::{BackendError, MemoryError};

/// Errors a unit reports from `initialize`, `run` or `stop`.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("unknown slot '{0}'")]
    UnknownSlot(String),

    #[error("invalid option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("input '{0}' is not linked")]
    UnlinkedInput(String),

    #[error("unknown unit type '{0}'")]
    UnknownType(String),

    #[error("unit requires a backend but none was resolved")]
    MissingBackend,

    #[error("run did not finish within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

impl UnitError {
    pub fn invalid_option(option: &str, reason: impl Into<String>) -> Self {
        UnitError::InvalidOption {
            option: option.to_string(),
            reason: reason.into(),
        }
    }
}
