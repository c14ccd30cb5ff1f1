// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a buffer.
///
/// The serialized names follow the `precision_type` setting: `float` for
/// 32-bit and `double` for 64-bit elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    #[serde(rename = "float")]
    F32,
    #[serde(rename = "double")]
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DType::F32 => "float",
            DType::F64 => "double",
        }
    }

    /// WebAssembly value type holding one element.
    pub fn wasm_type(&self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }

    /// Parse a `precision_type` value (`float`/`double`, or `f32`/`f64`).
    pub fn from_precision(name: &str) -> Option<Self> {
        match name {
            "float" | "f32" => Some(DType::F32),
            "double" | "f64" => Some(DType::F64),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dimensions of a buffer. An empty shape is a scalar holding one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(pub Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn vector(len: usize) -> Self {
        Self(vec![len])
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Number of elements; a zero-sized dimension yields zero.
    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

/// Resolved shape and element type of a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferSpec {
    pub shape: Shape,
    pub dtype: DType,
}

impl BufferSpec {
    pub fn new(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self {
            shape: shape.into(),
            dtype,
        }
    }

    pub fn element_count(&self) -> usize {
        self.shape.element_count()
    }

    pub fn byte_len(&self) -> usize {
        self.element_count() * self.dtype.size()
    }
}

impl fmt::Display for BufferSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}

/// Shape as known when a slot is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeSpec {
    /// Shape is part of the unit's interface and checked at link time.
    Fixed(Shape),
    /// Shape is not known until `initialize` (outputs) or accepts anything (inputs).
    Deferred,
}

/// One named input or output of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    pub name: String,
    pub shape: ShapeSpec,
    /// `None` means the workflow's default precision.
    pub dtype: Option<DType>,
}

impl SlotSpec {
    pub fn fixed(name: impl Into<String>, shape: impl Into<Shape>, dtype: Option<DType>) -> Self {
        Self {
            name: name.into(),
            shape: ShapeSpec::Fixed(shape.into()),
            dtype,
        }
    }

    pub fn deferred(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: ShapeSpec::Deferred,
            dtype: None,
        }
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn fixed_shape(&self) -> Option<&Shape> {
        match &self.shape {
            ShapeSpec::Fixed(shape) => Some(shape),
            ShapeSpec::Deferred => None,
        }
    }
}
