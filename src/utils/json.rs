// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Encoding of host values into JSON trees.
//!
//! Arrays nest along their shape, so a `[2, 3]` buffer becomes a list of two
//! lists of three numbers and an empty shape becomes a bare number. Complex
//! numbers are `[re, im]` pairs, sets are lists, and byte strings map each
//! byte to the character with the same code point.
//!
//! Non-finite floats have no JSON form and encode as `null`.

use serde::ser::{Serialize, SerializeSeq, SerializeTuple, Serializer};
use serde_json::{Number, Value};

/// A value that can be written into a JSON report.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// Row-major elements with their dimensions.
    Array { values: Vec<f64>, dims: Vec<usize> },
    Scalar(f64),
    Integer(i64),
    Complex(f64, f64),
    Set(Vec<HostValue>),
    Bytes(Vec<u8>),
}

impl HostValue {
    pub fn array(values: Vec<f64>, dims: &[usize]) -> Self {
        HostValue::Array {
            values,
            dims: dims.to_vec(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            HostValue::Array { values, dims } => nest(values, dims),
            HostValue::Scalar(value) => number(*value),
            HostValue::Integer(value) => Value::from(*value),
            HostValue::Complex(re, im) => Value::Array(vec![number(*re), number(*im)]),
            HostValue::Set(items) => Value::Array(items.iter().map(HostValue::to_json).collect()),
            HostValue::Bytes(bytes) => Value::String(charmap(bytes)),
        }
    }
}

impl Serialize for HostValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HostValue::Array { .. } => self.to_json().serialize(serializer),
            HostValue::Scalar(value) => serializer.serialize_f64(*value),
            HostValue::Integer(value) => serializer.serialize_i64(*value),
            HostValue::Complex(re, im) => {
                let mut pair = serializer.serialize_tuple(2)?;
                pair.serialize_element(re)?;
                pair.serialize_element(im)?;
                pair.end()
            }
            HostValue::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            HostValue::Bytes(bytes) => serializer.serialize_str(&charmap(bytes)),
        }
    }
}

/// Nest row-major `values` into arrays following `dims`.
pub fn nest(values: &[f64], dims: &[usize]) -> Value {
    let Some((&outer, inner)) = dims.split_first() else {
        return values.first().map(|v| number(*v)).unwrap_or(Value::Null);
    };
    let stride: usize = inner.iter().product();
    Value::Array(
        (0..outer)
            .map(|i| {
                let start = (i * stride).min(values.len());
                let end = (start + stride).min(values.len());
                nest(&values[start..end], inner)
            })
            .collect(),
    )
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn charmap(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
