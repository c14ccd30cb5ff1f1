// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::memory::{DType, HostData};

/// Scalar types a buffer can be mapped as.
pub trait Element: bytemuck::Pod + Send + Sync + 'static {
    const DTYPE: DType;

    fn slice(data: &HostData) -> Option<&[Self]>;

    fn slice_mut(data: &mut HostData) -> Option<&mut [Self]>;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn slice(data: &HostData) -> Option<&[Self]> {
        match data {
            HostData::F32(values) => Some(values),
            _ => None,
        }
    }

    fn slice_mut(data: &mut HostData) -> Option<&mut [Self]> {
        match data {
            HostData::F32(values) => Some(values),
            _ => None,
        }
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    fn slice(data: &HostData) -> Option<&[Self]> {
        match data {
            HostData::F64(values) => Some(values),
            _ => None,
        }
    }

    fn slice_mut(data: &mut HostData) -> Option<&mut [Self]> {
        match data {
            HostData::F64(values) => Some(values),
            _ => None,
        }
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}
