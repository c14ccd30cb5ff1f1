// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Deserialize;

use crate::backends::{Kernel, KernelSource};
use crate::engine::{InitContext, LaunchArg, RunContext};
use crate::errors::UnitError;
use crate::memory::{DType, SlotSpec};
use crate::traits::{BackendRequest, Unit};
use crate::units::UnitOptions;

fn default_factor() -> f64 {
    2.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScaleConfig {
    #[serde(default = "default_factor")]
    pub factor: f64,
}

/// `output = input * factor`, on the host or on a backend.
pub struct ScaleUnit {
    factor: f64,
    backend: Option<BackendRequest>,
    kernel: Option<Kernel>,
    len: usize,
}

impl ScaleUnit {
    pub const TYPE_NAME: &'static str = "scale";

    /// A host unit.
    pub fn new(factor: f64) -> Self {
        Self {
            factor,
            backend: None,
            kernel: None,
            len: 0,
        }
    }

    /// Launch the multiplication as a kernel on `backend`.
    pub fn on_backend(mut self, backend: BackendRequest) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn from_options(options: &UnitOptions) -> Result<Self, UnitError> {
        let config: ScaleConfig = options.parse()?;
        if !config.factor.is_finite() {
            return Err(UnitError::invalid_option("factor", "must be finite"));
        }
        let unit = Self::new(config.factor);
        Ok(match options.backend() {
            Some(request) => unit.on_backend(request.clone()),
            None => unit,
        })
    }
}

/// Kernel `(gid, src, dst, factor)`: `dst[gid] = src[gid] * factor`.
pub fn wasm_source(dtype: DType) -> String {
    let ty = dtype.wasm_type();
    let factor = match dtype {
        DType::F32 => "(f32.demote_f64 (local.get $factor))",
        DType::F64 => "(local.get $factor)",
    };
    format!(
        r#"(module
  (import "env" "memory" (memory 1))
  (func (export "kernel") (param $gid i32) (param $src i32) (param $dst i32) (param $factor f64)
    (local $offset i32)
    (local.set $offset (i32.mul (local.get $gid) (i32.const {size})))
    ({ty}.store
      (i32.add (local.get $dst) (local.get $offset))
      ({ty}.mul
        ({ty}.load (i32.add (local.get $src) (local.get $offset)))
        {factor}))))"#,
        size = dtype.size(),
        ty = ty,
        factor = factor,
    )
}

pub fn kernel_source(dtype: DType) -> KernelSource {
    KernelSource::new(format!("scale_{}", dtype.wasm_type()))
        .with_wasm(wasm_source(dtype))
        .with_host(|args, n| {
            let factor = args[2].scalar().ok_or("argument 2 must be the factor")?;
            let input = args[0].host().ok_or("argument 0 must be a buffer")?.to_f64_vec();
            let scaled: Vec<f64> = input.iter().take(n).map(|v| v * factor).collect();
            let output = args[1].host_mut().ok_or("argument 1 must be a buffer")?;
            if !output.copy_from_f64(&scaled) {
                return Err(format!("output holds {} elements, {} computed", output.len(), scaled.len()));
            }
            Ok(())
        })
}

#[async_trait]
impl Unit for ScaleUnit {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn declare_inputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::deferred("input")]
    }

    fn declare_outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::deferred("output")]
    }

    fn backend_request(&self) -> Option<BackendRequest> {
        self.backend.clone()
    }

    async fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
        let input = ctx.input_spec("input")?;
        ctx.resize_output("output", input.shape.clone())?;
        self.len = input.element_count();
        if self.backend.is_some() {
            self.kernel = Some(ctx.compile(&kernel_source(input.dtype))?);
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
        match &self.kernel {
            Some(kernel) => ctx.launch(
                kernel,
                &[
                    LaunchArg::Input("input"),
                    LaunchArg::Output("output"),
                    LaunchArg::Scalar(self.factor),
                ],
                self.len,
            ),
            None => {
                let scaled: Vec<f64> = ctx
                    .input_f64("input")?
                    .iter()
                    .map(|v| v * self.factor)
                    .collect();
                ctx.write_output_f64("output", &scaled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_defaults_to_two() {
        let unit = ScaleUnit::from_options(&UnitOptions::default()).unwrap();
        assert_eq!(unit.factor, 2.0);
        assert!(unit.backend_request().is_none());
    }

    #[test]
    fn test_backend_comes_from_options() {
        let options = UnitOptions::default().with_backend(BackendRequest::new("wasm", 1));
        let unit = ScaleUnit::from_options(&options).unwrap();
        assert_eq!(unit.backend_request(), Some(BackendRequest::new("wasm", 1)));
    }

    #[test]
    fn test_wasm_source_uses_element_type() {
        assert!(wasm_source(DType::F64).contains("f64.load"));
        let f32_text = wasm_source(DType::F32);
        assert!(f32_text.contains("f32.store"));
        assert!(f32_text.contains("i32.const 4"));
    }
}
