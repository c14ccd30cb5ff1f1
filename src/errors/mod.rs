// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod backend;
mod config;
mod memory;
mod unit;
mod workflow;

pub use backend::BackendError;
pub use config::{ConfigError, ValidationError};
pub use memory::MemoryError;
pub use unit::UnitError;
pub use workflow::WorkflowError;
