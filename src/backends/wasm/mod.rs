// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! WebAssembly device backend.
//!
//! Each device index owns an isolated wasmtime store and linear memory, so
//! two indices never alias each other's allocations.

pub mod driver;
pub mod pool;

pub use driver::{WasmDriver, KERNEL_EXPORT};
pub use pool::DevicePool;
