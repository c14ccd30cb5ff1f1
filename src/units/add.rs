// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::backends::{Kernel, KernelSource};
use crate::engine::{InitContext, LaunchArg, RunContext};
use crate::errors::UnitError;
use crate::memory::{DType, SlotSpec};
use crate::traits::{BackendRequest, Unit};
use crate::units::UnitOptions;

/// Element-wise `output = a + b` on a backend. Both inputs must have the
/// same shape.
pub struct AddUnit {
    backend: BackendRequest,
    kernel: Option<Kernel>,
    len: usize,
}

impl AddUnit {
    pub const TYPE_NAME: &'static str = "add";

    pub fn new(backend: BackendRequest) -> Self {
        Self {
            backend,
            kernel: None,
            len: 0,
        }
    }

    /// Uses the requested backend, or `auto` when none is given.
    pub fn from_options(options: &UnitOptions) -> Result<Self, UnitError> {
        Ok(Self::new(
            options.backend().cloned().unwrap_or_else(BackendRequest::auto),
        ))
    }
}

pub fn kernel_source(dtype: DType) -> KernelSource {
    let ty = dtype.wasm_type();
    let wasm = format!(
        r#"(module
  (import "env" "memory" (memory 1))
  (func (export "kernel") (param $gid i32) (param $a i32) (param $b i32) (param $out i32)
    (local $offset i32)
    (local.set $offset (i32.mul (local.get $gid) (i32.const {size})))
    ({ty}.store
      (i32.add (local.get $out) (local.get $offset))
      ({ty}.add
        ({ty}.load (i32.add (local.get $a) (local.get $offset)))
        ({ty}.load (i32.add (local.get $b) (local.get $offset)))))))"#,
        size = dtype.size(),
        ty = ty,
    );
    KernelSource::new(format!("add_{}", ty))
        .with_wasm(wasm)
        .with_host(|args, n| {
            let a = args[0].host().ok_or("argument 0 must be a buffer")?.to_f64_vec();
            let b = args[1].host().ok_or("argument 1 must be a buffer")?.to_f64_vec();
            let sum: Vec<f64> = a.iter().zip(&b).take(n).map(|(x, y)| x + y).collect();
            let output = args[2].host_mut().ok_or("argument 2 must be a buffer")?;
            if !output.copy_from_f64(&sum) {
                return Err(format!("output holds {} elements, {} computed", output.len(), sum.len()));
            }
            Ok(())
        })
}

#[async_trait]
impl Unit for AddUnit {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn declare_inputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::deferred("a"), SlotSpec::deferred("b")]
    }

    fn declare_outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::deferred("output")]
    }

    fn backend_request(&self) -> Option<BackendRequest> {
        Some(self.backend.clone())
    }

    async fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
        let a = ctx.input_spec("a")?;
        let b = ctx.input_spec("b")?;
        if a.shape != b.shape {
            return Err(UnitError::Failed(format!(
                "inputs differ in shape: a is {}, b is {}",
                a.shape, b.shape
            )));
        }
        ctx.resize_output("output", a.shape.clone())?;
        self.len = a.element_count();
        self.kernel = Some(ctx.compile(&kernel_source(a.dtype))?);
        Ok(())
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
        let kernel = self
            .kernel
            .as_ref()
            .ok_or_else(|| UnitError::Failed("add unit was not initialized".to_string()))?;
        ctx.launch(
            kernel,
            &[
                LaunchArg::Input("a"),
                LaunchArg::Input("b"),
                LaunchArg::Output("output"),
            ],
            self.len,
        )
    }
}
