// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The host/device synchronized buffer.
//!
//! # Residency protocol
//!
//! ```text
//!            map_for_write / launch on host
//!   Synced ─────────────────────────────────▶ HostAhead
//!     ▲  ▲                                        │
//!     │  └──────── ensure_on_device(b) ◀──────────┘
//!     │
//!     └──── map_for_read ◀──── DeviceAhead(b) ◀──── launch on b
//! ```
//!
//! Each backend gets its own allocation; an allocation is `fresh` when it
//! holds the same bytes as the authoritative copy. Stale allocations are
//! refreshed from the host on the next `ensure_on_device`.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::backends::{Backend, BackendId};
use crate::errors::MemoryError;
use crate::memory::{BufferSpec, DType, Element, Shape};
use crate::observability::messages::memory::{
    BufferResized, BufferSynchronized, DeviceReleaseFailed, SyncDirection,
};
use crate::observability::messages::StructuredLog;
use crate::traits::DevicePtr;
use crate::utils::HostValue;

/// Opaque handle of a buffer inside its workflow's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(usize);

impl BufferId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Host copy of a buffer's elements.
#[derive(Debug, Clone, PartialEq)]
pub enum HostData {
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl HostData {
    pub fn zeroed(spec: &BufferSpec) -> Self {
        let len = spec.element_count();
        match spec.dtype {
            DType::F32 => HostData::F32(vec![0.0; len]),
            DType::F64 => HostData::F64(vec![0.0; len]),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            HostData::F32(_) => DType::F32,
            HostData::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostData::F32(values) => values.len(),
            HostData::F64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            HostData::F32(values) => bytemuck::cast_slice(values),
            HostData::F64(values) => bytemuck::cast_slice(values),
        }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            HostData::F32(values) => bytemuck::cast_slice_mut(values),
            HostData::F64(values) => bytemuck::cast_slice_mut(values),
        }
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            HostData::F32(values) => values.iter().map(|v| *v as f64).collect(),
            HostData::F64(values) => values.clone(),
        }
    }

    /// Overwrite every element, converting from `f64`.
    ///
    /// Returns `false` when `values` has the wrong length.
    pub fn copy_from_f64(&mut self, values: &[f64]) -> bool {
        if values.len() != self.len() {
            return false;
        }
        match self {
            HostData::F32(dst) => dst
                .iter_mut()
                .zip(values)
                .for_each(|(d, s)| *d = *s as f32),
            HostData::F64(dst) => dst.copy_from_slice(values),
        }
        true
    }
}

/// Which copy of a buffer is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Residency {
    /// Host is current; fresh device allocations hold the same bytes.
    Synced,
    /// Host was written; every device allocation is stale.
    HostAhead,
    /// The given backend wrote its allocation; host and other devices are stale.
    DeviceAhead(BackendId),
}

struct DeviceAllocation {
    backend: Backend,
    ptr: DevicePtr,
    fresh: bool,
}

impl Drop for DeviceAllocation {
    fn drop(&mut self) {
        if let Err(error) = self.backend.driver().free(self.ptr) {
            DeviceReleaseFailed {
                backend: &self.backend.id().to_string(),
                ptr: self.ptr,
                error: &error,
            }
            .log();
        }
    }
}

/// One logical array with a host copy and lazily created device copies.
pub struct Buffer {
    id: BufferId,
    name: String,
    spec: BufferSpec,
    host: HostData,
    residency: Residency,
    device: Vec<DeviceAllocation>,
}

impl Buffer {
    pub fn new(id: BufferId, name: impl Into<String>, spec: BufferSpec) -> Self {
        Self {
            id,
            name: name.into(),
            host: HostData::zeroed(&spec),
            spec,
            residency: Residency::Synced,
            device: Vec::new(),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &BufferSpec {
        &self.spec
    }

    pub fn shape(&self) -> &Shape {
        &self.spec.shape
    }

    pub fn dtype(&self) -> DType {
        self.spec.dtype
    }

    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    pub fn residency(&self) -> &Residency {
        &self.residency
    }

    pub fn host_dirty(&self) -> bool {
        self.residency == Residency::HostAhead
    }

    pub fn device_dirty(&self) -> bool {
        matches!(self.residency, Residency::DeviceAhead(_))
    }

    /// Number of backends currently holding an allocation for this buffer.
    pub fn device_allocations(&self) -> usize {
        self.device.len()
    }

    /// Whether `backend` holds an allocation with current contents.
    pub fn is_fresh_on(&self, backend: &BackendId) -> bool {
        self.device
            .iter()
            .any(|a| a.backend.id() == backend && a.fresh)
    }

    /// Map the host copy for reading, pulling it from the device when the
    /// device is ahead.
    pub fn map_for_read<T: Element>(&mut self) -> Result<&[T], MemoryError> {
        self.check_dtype::<T>()?;
        self.sync_to_host()?;
        self.host_slice::<T>()
    }

    /// Map the host copy for overwriting.
    ///
    /// Device copies are invalidated immediately and nothing is copied back,
    /// so the caller must overwrite every element it cares about. The buffer
    /// becomes host-dirty when the guard is released.
    pub fn map_for_write<T: Element>(&mut self) -> Result<BufferWriteGuard<'_, T>, MemoryError> {
        self.check_dtype::<T>()?;
        self.write_guard()
    }

    /// Like [`Buffer::map_for_write`], but synchronizes first so in-place
    /// edits see current contents.
    pub fn map_for_update<T: Element>(&mut self) -> Result<BufferWriteGuard<'_, T>, MemoryError> {
        self.check_dtype::<T>()?;
        self.sync_to_host()?;
        self.write_guard()
    }

    /// Overwrite the host copy from `f64` values, converting to the buffer's dtype.
    pub fn write_f64(&mut self, values: &[f64]) -> Result<(), MemoryError> {
        if !self.host.copy_from_f64(values) {
            return Err(MemoryError::ShapeMismatch {
                buffer: self.id,
                name: self.name.clone(),
                expected: self.spec.shape.clone(),
                actual: Shape::vector(values.len()),
            });
        }
        self.mark_host_written();
        Ok(())
    }

    /// Read the current contents as `f64`, whatever the dtype.
    pub fn read_f64(&mut self) -> Result<Vec<f64>, MemoryError> {
        self.sync_to_host()?;
        Ok(self.host.to_f64_vec())
    }

    /// Borrow the host copy without synchronizing. Callers must have synced.
    pub(crate) fn host_slice<T: Element>(&self) -> Result<&[T], MemoryError> {
        T::slice(&self.host).ok_or_else(|| self.dtype_error(T::DTYPE))
    }

    pub(crate) fn host_mut(&mut self) -> &mut HostData {
        &mut self.host
    }

    /// Copy device data back when a device is ahead. A clean buffer is untouched.
    pub fn sync_to_host(&mut self) -> Result<(), MemoryError> {
        let Residency::DeviceAhead(owner) = &self.residency else {
            return Ok(());
        };
        let allocation = self
            .device
            .iter()
            .find(|a| a.backend.id() == owner)
            .ok_or_else(|| MemoryError::BackendUnavailable {
                buffer: self.id,
                name: self.name.clone(),
                backend: owner.to_string(),
            })?;
        allocation
            .backend
            .driver()
            .read(allocation.ptr, self.host.as_bytes_mut())?;
        BufferSynchronized {
            buffer: self.id,
            name: &self.name,
            backend: &owner.to_string(),
            direction: SyncDirection::DeviceToHost,
            bytes: self.spec.byte_len(),
        }
        .log();
        self.residency = Residency::Synced;
        Ok(())
    }

    /// Make this buffer's allocation on `backend` current and return its address.
    ///
    /// Allocates on first use. Uploads when the host is ahead or the
    /// allocation is stale; when another backend is ahead the data travels
    /// through the host. Zero-element buffers never allocate.
    pub fn ensure_on_device(&mut self, backend: &Backend) -> Result<DevicePtr, MemoryError> {
        self.check_device(backend)?;
        if self.is_empty() {
            return Ok(DevicePtr::NULL);
        }
        if let Residency::DeviceAhead(owner) = &self.residency {
            if owner != backend.id() {
                self.sync_to_host()?;
            }
        }
        let slot = self.allocation_slot(backend)?;
        let allocation = &mut self.device[slot];
        if !allocation.fresh {
            backend.driver().write(allocation.ptr, self.host.as_bytes())?;
            allocation.fresh = true;
            BufferSynchronized {
                buffer: self.id,
                name: &self.name,
                backend: &backend.id().to_string(),
                direction: SyncDirection::HostToDevice,
                bytes: self.spec.byte_len(),
            }
            .log();
            if self.residency == Residency::HostAhead {
                self.residency = Residency::Synced;
            }
        }
        Ok(allocation.ptr)
    }

    /// Allocate on `backend` without uploading, for kernel arguments that are
    /// only written.
    pub fn invalidate_for_device(&mut self, backend: &Backend) -> Result<DevicePtr, MemoryError> {
        self.check_device(backend)?;
        if self.is_empty() {
            return Ok(DevicePtr::NULL);
        }
        let slot = self.allocation_slot(backend)?;
        Ok(self.device[slot].ptr)
    }

    /// Record that `backend` wrote its allocation.
    pub fn mark_device_written(&mut self, backend: &BackendId) {
        for allocation in &mut self.device {
            allocation.fresh = allocation.backend.id() == backend;
        }
        if !self.is_empty() {
            self.residency = Residency::DeviceAhead(backend.clone());
        }
    }

    /// Record that `backend` is about to write its allocation. Unless that
    /// allocation is already the authoritative copy, it stops counting as
    /// current, so an interrupted write leaves the host authoritative.
    pub fn begin_device_write(&mut self, backend: &BackendId) {
        if matches!(&self.residency, Residency::DeviceAhead(owner) if owner == backend) {
            return;
        }
        for allocation in &mut self.device {
            if allocation.backend.id() == backend {
                allocation.fresh = false;
            }
        }
    }

    /// Record that the host copy was written.
    pub fn mark_host_written(&mut self) {
        for allocation in &mut self.device {
            allocation.fresh = false;
        }
        self.residency = Residency::HostAhead;
    }

    /// Replace shape and dtype. Both copies are discarded and device memory released.
    pub fn resize(&mut self, spec: BufferSpec) {
        BufferResized {
            buffer: self.id,
            name: &self.name,
            from: &self.spec,
            to: &spec,
        }
        .log();
        self.device.clear();
        self.host = HostData::zeroed(&spec);
        self.spec = spec;
        self.residency = Residency::Synced;
    }

    /// Bring the host copy up to date and release every device allocation.
    pub fn reset(&mut self) -> Result<(), MemoryError> {
        self.sync_to_host()?;
        self.device.clear();
        self.residency = Residency::Synced;
        Ok(())
    }

    /// Materialize to a nested JSON array following the buffer's shape.
    pub fn materialize(&mut self) -> Result<serde_json::Value, MemoryError> {
        let values = self.read_f64()?;
        Ok(HostValue::array(values, self.spec.shape.dims()).to_json())
    }

    fn write_guard<T: Element>(&mut self) -> Result<BufferWriteGuard<'_, T>, MemoryError> {
        for allocation in &mut self.device {
            allocation.fresh = false;
        }
        let Buffer {
            id,
            name,
            host,
            residency,
            ..
        } = self;
        let actual = host.dtype();
        let data = T::slice_mut(host).ok_or_else(|| MemoryError::DTypeMismatch {
            buffer: *id,
            name: name.clone(),
            actual,
            requested: T::DTYPE,
        })?;
        Ok(BufferWriteGuard {
            data,
            residency,
            _marker: PhantomData,
        })
    }

    fn allocation_slot(&mut self, backend: &Backend) -> Result<usize, MemoryError> {
        if let Some(slot) = self
            .device
            .iter()
            .position(|a| a.backend.id() == backend.id())
        {
            return Ok(slot);
        }
        let ptr = backend.driver().allocate(self.spec.byte_len())?;
        self.device.push(DeviceAllocation {
            backend: backend.clone(),
            ptr,
            fresh: false,
        });
        Ok(self.device.len() - 1)
    }

    fn check_device(&self, backend: &Backend) -> Result<(), MemoryError> {
        if backend.is_host_resident() {
            return Err(MemoryError::BackendUnavailable {
                buffer: self.id,
                name: self.name.clone(),
                backend: backend.id().to_string(),
            });
        }
        Ok(())
    }

    fn check_dtype<T: Element>(&self) -> Result<(), MemoryError> {
        if self.spec.dtype != T::DTYPE {
            return Err(self.dtype_error(T::DTYPE));
        }
        Ok(())
    }

    fn dtype_error(&self, requested: DType) -> MemoryError {
        MemoryError::DTypeMismatch {
            buffer: self.id,
            name: self.name.clone(),
            actual: self.spec.dtype,
            requested,
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("residency", &self.residency)
            .field(
                "device",
                &self
                    .device
                    .iter()
                    .map(|a| a.backend.id().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Write access to a buffer's host copy. Dropping it marks the host dirty.
pub struct BufferWriteGuard<'a, T: Element> {
    data: &'a mut [T],
    residency: &'a mut Residency,
    _marker: PhantomData<T>,
}

impl<T: Element> BufferWriteGuard<'_, T> {
    /// Finish writing. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl<T: Element> Deref for BufferWriteGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data
    }
}

impl<T: Element> DerefMut for BufferWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.data
    }
}

impl<T: Element> Drop for BufferWriteGuard<'_, T> {
    fn drop(&mut self) {
        *self.residency = Residency::HostAhead;
    }
}
