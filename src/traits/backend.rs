// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

use crate::backends::KernelSource;
use crate::errors::BackendError;
use crate::memory::HostData;

/// Address of an allocation inside a device's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr(pub u64);

impl DevicePtr {
    /// Address handed out for zero-byte requests; never backed by memory.
    pub const NULL: DevicePtr = DevicePtr(0);
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Driver-local identifier of a compiled kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub usize);

/// One resolved kernel argument as the driver sees it.
pub enum DispatchArg<'a> {
    /// Address of a buffer's allocation on this device.
    Device(DevicePtr),
    /// Host copy of a buffer, for host-resident drivers.
    Host(&'a mut HostData),
    Scalar(f64),
}

impl DispatchArg<'_> {
    pub fn host(&self) -> Option<&HostData> {
        match self {
            DispatchArg::Host(data) => Some(data),
            _ => None,
        }
    }

    pub fn host_mut(&mut self) -> Option<&mut HostData> {
        match self {
            DispatchArg::Host(data) => Some(data),
            _ => None,
        }
    }

    pub fn scalar(&self) -> Option<f64> {
        match self {
            DispatchArg::Scalar(value) => Some(*value),
            _ => None,
        }
    }
}

/// One compute device: memory management, kernel compilation and dispatch.
///
/// Drivers are shared between threads behind a [`crate::backends::Backend`]
/// handle and guard their own mutable state. Launches are synchronous: when
/// `dispatch` returns, every write the kernel made is visible to `read`.
pub trait BackendDriver: Send + Sync {
    fn kind(&self) -> &str;

    fn index(&self) -> usize;

    /// Host-resident drivers own no device memory. Buffers stay on the host
    /// and kernels receive [`DispatchArg::Host`] arguments.
    fn host_resident(&self) -> bool {
        false
    }

    fn allocate(&self, bytes: usize) -> Result<DevicePtr, BackendError>;

    fn free(&self, ptr: DevicePtr) -> Result<(), BackendError>;

    /// Copy host bytes into an allocation.
    fn write(&self, ptr: DevicePtr, data: &[u8]) -> Result<(), BackendError>;

    /// Copy an allocation into host bytes.
    fn read(&self, ptr: DevicePtr, out: &mut [u8]) -> Result<(), BackendError>;

    fn compile(&self, source: &KernelSource) -> Result<KernelHandle, BackendError>;

    fn dispatch(
        &self,
        kernel: KernelHandle,
        args: &mut [DispatchArg<'_>],
        work_size: usize,
    ) -> Result<(), BackendError>;

    /// Allocations made and not yet freed.
    fn live_allocations(&self) -> usize;

    /// Wait for outstanding work. Drivers with synchronous dispatch have none.
    fn synchronize(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
