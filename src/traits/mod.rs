// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backend;
pub mod unit;

pub use backend::{BackendDriver, DevicePtr, DispatchArg, KernelHandle};
pub use unit::{BackendRequest, Unit};
