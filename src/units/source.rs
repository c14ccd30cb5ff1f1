// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Deserialize;

use crate::engine::{InitContext, RunContext};
use crate::errors::UnitError;
use crate::memory::{DType, Shape, SlotSpec};
use crate::traits::Unit;
use crate::units::UnitOptions;

/// Options of the `source` unit.
///
/// ```yaml
/// values: [1, 2, 3, 4, 5, 6]
/// shape: [2, 3]          # default: one dimension of len(values)
/// precision: double      # default: the workflow precision
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub values: Vec<f64>,
    #[serde(default)]
    pub shape: Option<Vec<usize>>,
    #[serde(default)]
    pub precision: Option<String>,
}

/// Host unit that emits a constant array every tick.
pub struct SourceUnit {
    values: Vec<f64>,
    shape: Shape,
    dtype: Option<DType>,
}

impl SourceUnit {
    pub const TYPE_NAME: &'static str = "source";

    /// A one-dimensional source in the workflow precision.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            shape: Shape::vector(values.len()),
            values,
            dtype: None,
        }
    }

    pub fn with_shape(values: Vec<f64>, shape: impl Into<Shape>) -> Result<Self, UnitError> {
        let shape = shape.into();
        if shape.element_count() != values.len() {
            return Err(UnitError::invalid_option(
                "shape",
                format!("{} holds {} elements, {} values given", shape, shape.element_count(), values.len()),
            ));
        }
        Ok(Self {
            values,
            shape,
            dtype: None,
        })
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn from_options(options: &UnitOptions) -> Result<Self, UnitError> {
        let config: SourceConfig = options.parse()?;
        let unit = match config.shape {
            Some(dims) => Self::with_shape(config.values, dims)?,
            None => Self::new(config.values),
        };
        match config.precision {
            Some(name) => {
                let dtype = DType::from_precision(&name).ok_or_else(|| {
                    UnitError::invalid_option("precision", format!("unknown precision '{}'", name))
                })?;
                Ok(unit.with_dtype(dtype))
            }
            None => Ok(unit),
        }
    }
}

#[async_trait]
impl Unit for SourceUnit {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn declare_inputs(&self) -> Vec<SlotSpec> {
        Vec::new()
    }

    fn declare_outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::fixed("output", self.shape.clone(), self.dtype)]
    }

    async fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
        ctx.write_output_f64("output", &self.values)
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
        ctx.write_output_f64("output", &self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_must_hold_values() {
        assert!(SourceUnit::with_shape(vec![1.0, 2.0, 3.0], vec![2, 2]).is_err());
        let unit = SourceUnit::with_shape(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        assert_eq!(unit.declare_outputs()[0].fixed_shape(), Some(&Shape::new(vec![2, 2])));
    }

    #[test]
    fn test_from_options() {
        let options = UnitOptions::new(
            serde_yaml::from_str("values: [1, 2]\nprecision: double").unwrap(),
        );
        let unit = SourceUnit::from_options(&options).unwrap();
        assert_eq!(unit.declare_outputs()[0].dtype, Some(DType::F64));

        let options = UnitOptions::new(serde_yaml::from_str("values: [1]\nprecision: half").unwrap());
        assert!(SourceUnit::from_options(&options).is_err());
    }
}
