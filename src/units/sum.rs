// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::engine::{InitContext, RunContext};
use crate::errors::UnitError;
use crate::memory::{Shape, SlotSpec};
use crate::traits::Unit;
use crate::units::UnitOptions;

/// Host unit reducing its input to a scalar sum.
#[derive(Debug, Default)]
pub struct SumUnit;

impl SumUnit {
    pub const TYPE_NAME: &'static str = "sum";

    pub fn new() -> Self {
        Self
    }

    pub fn from_options(_options: &UnitOptions) -> Result<Self, UnitError> {
        Ok(Self)
    }
}

#[async_trait]
impl Unit for SumUnit {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn declare_inputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::deferred("input")]
    }

    fn declare_outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::fixed("sum", Shape::scalar(), None)]
    }

    async fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
        Ok(())
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
        let total: f64 = ctx.input_f64("input")?.iter().sum();
        ctx.write_output_f64("sum", &[total])
    }
}
