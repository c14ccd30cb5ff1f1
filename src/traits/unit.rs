// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::engine::{InitContext, RunContext};
use crate::errors::UnitError;
use crate::memory::SlotSpec;

/// Backend kind that resolves to the `engine.backend` setting.
pub const AUTO_BACKEND: &str = "auto";

/// The device a unit wants to run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    pub kind: String,
    pub index: usize,
}

impl BackendRequest {
    pub fn new(kind: impl Into<String>, index: usize) -> Self {
        Self {
            kind: kind.into(),
            index,
        }
    }

    /// Let the workflow settings pick the backend kind.
    pub fn auto() -> Self {
        Self::new(AUTO_BACKEND, 0)
    }

    pub fn is_auto(&self) -> bool {
        self.kind == AUTO_BACKEND
    }
}

/// One node of computation in a workflow.
///
/// Slots are declared once, when the unit is added. `initialize` runs once,
/// after every input is linked and every producer is initialized, so input
/// shapes are resolved. `run` is called once per tick and must compute from
/// the tick's current inputs without relying on state from earlier ticks.
#[async_trait]
pub trait Unit: Send {
    /// Stable type name, as used by the unit registry.
    fn type_name(&self) -> &'static str;

    fn declare_inputs(&self) -> Vec<SlotSpec>;

    fn declare_outputs(&self) -> Vec<SlotSpec>;

    /// `None` for host-only units.
    fn backend_request(&self) -> Option<BackendRequest> {
        None
    }

    async fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), UnitError>;

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError>;

    /// Release resources held outside the workflow's buffers.
    async fn stop(&mut self) -> Result<(), UnitError> {
        Ok(())
    }
}
