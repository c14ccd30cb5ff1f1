// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Host/device synchronized memory.
//!
//! A [`Buffer`] owns one logical array. Its host copy lives in [`HostData`];
//! each backend that touches it gets its own device allocation. The buffer's
//! [`Residency`] records which side is authoritative, so at most one side is
//! ever ahead and every read or launch pulls data across only when it is stale.
//!
//! Buffers are owned by a [`BufferArena`] (one per workflow); units refer to
//! them through [`BufferId`] handles.

mod arena;
mod buffer;
mod element;
mod spec;

pub use arena::BufferArena;
pub use buffer::{Buffer, BufferId, BufferWriteGuard, HostData, Residency};
pub use element::Element;
pub use spec::{BufferSpec, DType, Shape, ShapeSpec, SlotSpec};
