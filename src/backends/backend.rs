// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The shared [`Backend`] handle and kernel types.
//!
//! A `Backend` wraps one [`BackendDriver`] bound to one device. Handles are
//! cheap to clone; every clone shares the driver and the compiled-kernel
//! cache, so a kernel compiled by one unit is reused by every other unit on
//! the same device.

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::errors::{BackendError, MemoryError};
use crate::memory::Buffer;
use crate::observability::messages::backend::{
    KernelCacheHit, KernelCompileFailed, KernelCompiled, KernelLaunched,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{BackendDriver, DispatchArg, KernelHandle};

/// Identity of a backend: kind plus device index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId {
    pub kind: String,
    pub index: usize,
}

impl BackendId {
    pub fn new(kind: impl Into<String>, index: usize) -> Self {
        Self {
            kind: kind.into(),
            index,
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.index)
    }
}

/// Host implementation of a kernel: receives the resolved arguments and the
/// work size.
pub type HostKernel =
    Arc<dyn Fn(&mut [DispatchArg<'_>], usize) -> Result<(), String> + Send + Sync>;

/// A kernel with one rendition per backend family.
#[derive(Clone)]
pub struct KernelSource {
    name: String,
    wasm: Option<String>,
    host: Option<HostKernel>,
}

impl KernelSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wasm: None,
            host: None,
        }
    }

    /// WebAssembly text rendition, compiled by device backends.
    pub fn with_wasm(mut self, text: impl Into<String>) -> Self {
        self.wasm = Some(text.into());
        self
    }

    /// Host rendition, run by host-resident backends.
    pub fn with_host<F>(mut self, kernel: F) -> Self
    where
        F: Fn(&mut [DispatchArg<'_>], usize) -> Result<(), String> + Send + Sync + 'static,
    {
        self.host = Some(Arc::new(kernel));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wasm(&self) -> Option<&str> {
        self.wasm.as_deref()
    }

    pub fn host(&self) -> Option<&HostKernel> {
        self.host.as_ref()
    }

    /// Digest of the device source; host renditions are keyed by name alone.
    fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.wasm.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Debug for KernelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelSource")
            .field("name", &self.name)
            .field("wasm", &self.wasm.as_ref().map(|w| w.len()))
            .field("host", &self.host.is_some())
            .finish()
    }
}

/// A compiled kernel, valid only on the backend that compiled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    name: String,
    backend: BackendId,
    handle: KernelHandle,
}

impl Kernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &BackendId {
        &self.backend
    }

    pub fn handle(&self) -> KernelHandle {
        self.handle
    }
}

/// How a kernel uses a buffer argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    /// Every element is overwritten; current contents are not uploaded.
    Write,
    ReadWrite,
}

impl Access {
    pub fn reads(&self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn writes(&self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// One argument of a launch.
pub enum KernelArg<'a> {
    Buffer { buffer: &'a mut Buffer, access: Access },
    Scalar(f64),
}

impl<'a> KernelArg<'a> {
    pub fn read(buffer: &'a mut Buffer) -> Self {
        KernelArg::Buffer {
            buffer,
            access: Access::Read,
        }
    }

    pub fn write(buffer: &'a mut Buffer) -> Self {
        KernelArg::Buffer {
            buffer,
            access: Access::Write,
        }
    }

    pub fn read_write(buffer: &'a mut Buffer) -> Self {
        KernelArg::Buffer {
            buffer,
            access: Access::ReadWrite,
        }
    }
}

type KernelKey = (String, u64);

struct BackendInner {
    id: BackendId,
    driver: Box<dyn BackendDriver>,
    kernels: Mutex<HashMap<KernelKey, KernelHandle>>,
    compilations: AtomicUsize,
}

/// Shared handle to one device.
#[derive(Clone)]
pub struct Backend {
    inner: Arc<BackendInner>,
}

impl Backend {
    pub fn new(driver: Box<dyn BackendDriver>) -> Self {
        let id = BackendId::new(driver.kind(), driver.index());
        Self {
            inner: Arc::new(BackendInner {
                id,
                driver,
                kernels: Mutex::new(HashMap::new()),
                compilations: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> &BackendId {
        &self.inner.id
    }

    pub fn kind(&self) -> &str {
        &self.inner.id.kind
    }

    pub fn index(&self) -> usize {
        self.inner.id.index
    }

    pub fn driver(&self) -> &dyn BackendDriver {
        self.inner.driver.as_ref()
    }

    pub fn is_host_resident(&self) -> bool {
        self.inner.driver.host_resident()
    }

    pub fn live_allocations(&self) -> usize {
        self.inner.driver.live_allocations()
    }

    /// Number of kernels actually compiled, excluding cache hits.
    pub fn compilations(&self) -> usize {
        self.inner.compilations.load(Ordering::Relaxed)
    }

    /// Whether two handles refer to the same device instance.
    pub fn same_instance(&self, other: &Backend) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn synchronize(&self) -> Result<(), BackendError> {
        self.inner.driver.synchronize()
    }

    /// Compile `source`, or return the cached kernel with the same name and
    /// source text.
    pub fn compile(&self, source: &KernelSource) -> Result<Kernel, BackendError> {
        let backend = self.id().to_string();
        let key = (source.name().to_string(), source.digest());
        let mut kernels = self.inner.kernels.lock();

        if let Some(handle) = kernels.get(&key) {
            KernelCacheHit {
                backend: &backend,
                kernel: source.name(),
            }
            .log();
            return Ok(self.kernel(source.name(), *handle));
        }

        let start = Instant::now();
        let handle = self.inner.driver.compile(source).map_err(|error| {
            KernelCompileFailed {
                backend: &backend,
                kernel: source.name(),
                error: &error,
            }
            .log();
            error
        })?;
        self.inner.compilations.fetch_add(1, Ordering::Relaxed);
        KernelCompiled {
            backend: &backend,
            kernel: source.name(),
            duration: start.elapsed(),
        }
        .log();

        kernels.insert(key, handle);
        Ok(self.kernel(source.name(), handle))
    }

    /// Run `kernel` over `work_size` items and wait for it to finish.
    ///
    /// Readable buffers are made current where the kernel runs; written
    /// buffers are marked ahead on that side afterwards. A buffer may appear
    /// only once per launch and must hold at least `work_size` elements.
    ///
    /// When the kernel fails, written buffers never end up with two copies
    /// claiming to be current: a device launch leaves the host authoritative
    /// (unless the device already was), a host launch marks the host ahead.
    pub fn launch(
        &self,
        kernel: &Kernel,
        args: &mut [KernelArg<'_>],
        work_size: usize,
    ) -> Result<(), MemoryError> {
        if kernel.backend() != self.id() {
            return Err(BackendError::InvalidKernel {
                backend: self.id().to_string(),
                kernel: format!("{} (compiled on {})", kernel.name(), kernel.backend()),
            }
            .into());
        }
        check_aliasing(kernel, args)?;
        check_work_size(kernel, args, work_size)?;

        let start = Instant::now();
        if self.is_host_resident() {
            self.launch_on_host(kernel, args, work_size)?;
        } else {
            self.launch_on_device(kernel, args, work_size)?;
        }

        KernelLaunched {
            backend: &self.id().to_string(),
            kernel: kernel.name(),
            work_size,
            duration: start.elapsed(),
        }
        .log();
        Ok(())
    }

    fn launch_on_host(
        &self,
        kernel: &Kernel,
        args: &mut [KernelArg<'_>],
        work_size: usize,
    ) -> Result<(), MemoryError> {
        for arg in args.iter_mut() {
            if let KernelArg::Buffer { buffer, access } = arg {
                if access.reads() {
                    buffer.sync_to_host()?;
                }
            }
        }

        let result = {
            let mut dispatch: Vec<DispatchArg<'_>> = args
                .iter_mut()
                .map(|arg| match arg {
                    KernelArg::Buffer { buffer, .. } => DispatchArg::Host(buffer.host_mut()),
                    KernelArg::Scalar(value) => DispatchArg::Scalar(*value),
                })
                .collect();
            self.inner
                .driver
                .dispatch(kernel.handle(), &mut dispatch, work_size)
        };

        // A failed host kernel may have written part of its outputs in place.
        for arg in args.iter_mut() {
            if let KernelArg::Buffer { buffer, access } = arg {
                if access.writes() {
                    buffer.mark_host_written();
                }
            }
        }
        Ok(result?)
    }

    fn launch_on_device(
        &self,
        kernel: &Kernel,
        args: &mut [KernelArg<'_>],
        work_size: usize,
    ) -> Result<(), MemoryError> {
        let mut dispatch = Vec::with_capacity(args.len());
        for arg in args.iter_mut() {
            match arg {
                KernelArg::Buffer { buffer, access } => {
                    let ptr = if access.reads() {
                        buffer.ensure_on_device(self)?
                    } else {
                        buffer.invalidate_for_device(self)?
                    };
                    dispatch.push(DispatchArg::Device(ptr));
                }
                KernelArg::Scalar(value) => dispatch.push(DispatchArg::Scalar(*value)),
            }
        }

        for arg in args.iter_mut() {
            if let KernelArg::Buffer { buffer, access } = arg {
                if access.writes() {
                    buffer.begin_device_write(self.id());
                }
            }
        }

        self.inner
            .driver
            .dispatch(kernel.handle(), &mut dispatch, work_size)?;

        for arg in args.iter_mut() {
            if let KernelArg::Buffer { buffer, access } = arg {
                if access.writes() {
                    buffer.mark_device_written(self.id());
                }
            }
        }
        Ok(())
    }

    fn kernel(&self, name: &str, handle: KernelHandle) -> Kernel {
        Kernel {
            name: name.to_string(),
            backend: self.id().clone(),
            handle,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("id", &self.inner.id)
            .field("host_resident", &self.is_host_resident())
            .field("kernels", &self.inner.kernels.lock().len())
            .finish()
    }
}

fn check_aliasing(kernel: &Kernel, args: &[KernelArg<'_>]) -> Result<(), MemoryError> {
    let mut seen = Vec::with_capacity(args.len());
    for arg in args {
        if let KernelArg::Buffer { buffer, .. } = arg {
            if seen.contains(&buffer.id()) {
                return Err(MemoryError::AliasedBuffer {
                    buffer: buffer.id(),
                    context: format!("kernel '{}'", kernel.name()),
                });
            }
            seen.push(buffer.id());
        }
    }
    Ok(())
}

/// Every buffer argument must cover the whole launch.
fn check_work_size(kernel: &Kernel, args: &[KernelArg<'_>], work_size: usize) -> Result<(), MemoryError> {
    for arg in args {
        if let KernelArg::Buffer { buffer, .. } = arg {
            if buffer.len() < work_size {
                return Err(MemoryError::WorkSizeExceeded {
                    buffer: buffer.id(),
                    name: buffer.name().to_string(),
                    kernel: kernel.name().to_string(),
                    work_size,
                    len: buffer.len(),
                });
            }
        }
    }
    Ok(())
}
