// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Compute backends for veles workflows.
//!
//! A backend is one compute device. Units that declare a backend request get
//! a shared [`Backend`] handle during initialization and launch kernels
//! through it; the handle moves buffer contents to and from the device as
//! the buffers' residency requires.
//!
//! # Available Backends
//!
//! ## Numeric Backend (`numeric`)
//! Host fallback. Kernels are Rust closures operating on host slices:
//! - **Memory**: host-resident, no device copies are ever made
//! - **Devices**: index 0 only
//! - **Use Case**: reference results, machines without an accelerator
//!
//! ## WASM Backend (`wasm`)
//! Virtual accelerator built on wasmtime:
//! - **Memory**: one linear memory per device, managed by a first-fit pool
//! - **Kernels**: WebAssembly text, compiled once per device and cached
//! - **Limits**: fuel budget per work item, bounded memory growth
//! - **Devices**: `engine.wasm.devices` independent instances
//!
//! ## Stub Backend (Test-Only)
//! A recording driver that keeps device memory in a host map and counts
//! transfers, plus small units for exercising the scheduler. Only available
//! in test builds.
//!
//! # Architecture
//!
//! ```text
//! BackendRegistry ──factory──▶ Box<dyn BackendDriver> ──wrapped──▶ Backend
//!                                                                    │
//!                                   Unit ──compile/launch────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust
//! use veles_core::backends::{BackendRegistry, KernelSource};
//!
//! let registry = BackendRegistry::with_builtin();
//! let backend = registry.create("wasm", 0)?;
//! let source = KernelSource::new("noop").with_wasm(
//!     r#"(module (import "env" "memory" (memory 1)) (func (export "kernel") (param i32)))"#,
//! );
//! let kernel = backend.compile(&source)?;
//! assert_eq!(kernel.name(), "noop");
//! # Ok::<(), veles_core::errors::BackendError>(())
//! ```

mod backend;
pub mod numeric;
pub mod registry;
#[cfg(test)]
pub mod stub;
pub mod wasm;

pub use backend::{
    Access, Backend, BackendId, HostKernel, Kernel, KernelArg, KernelSource,
};
pub use registry::{BackendFactory, BackendRegistry};
