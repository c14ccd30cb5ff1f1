// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Host fallback backend. Kernels are ordinary Rust closures operating on
//! the buffers' host copies, so a device unit runs unchanged where no
//! accelerator exists.

use parking_lot::Mutex;

use crate::backends::backend::HostKernel;
use crate::backends::registry::NUMERIC;
use crate::backends::KernelSource;
use crate::errors::BackendError;
use crate::traits::{BackendDriver, DevicePtr, DispatchArg, KernelHandle};

pub struct NumericDriver {
    index: usize,
    kernels: Mutex<Vec<(String, HostKernel)>>,
}

impl NumericDriver {
    /// The host is a single device; only index 0 exists.
    pub fn new(index: usize) -> Result<Self, BackendError> {
        if index != 0 {
            return Err(BackendError::unavailable(
                NUMERIC,
                index,
                "the host backend only has device 0",
            ));
        }
        Ok(Self {
            index,
            kernels: Mutex::new(Vec::new()),
        })
    }

    fn no_device_memory(&self) -> BackendError {
        BackendError::Transfer {
            backend: format!("{}:{}", NUMERIC, self.index),
            reason: "host backend has no device memory".to_string(),
        }
    }
}

impl BackendDriver for NumericDriver {
    fn kind(&self) -> &str {
        NUMERIC
    }

    fn index(&self) -> usize {
        self.index
    }

    fn host_resident(&self) -> bool {
        true
    }

    fn allocate(&self, _bytes: usize) -> Result<DevicePtr, BackendError> {
        Err(self.no_device_memory())
    }

    fn free(&self, _ptr: DevicePtr) -> Result<(), BackendError> {
        Err(self.no_device_memory())
    }

    fn write(&self, _ptr: DevicePtr, _data: &[u8]) -> Result<(), BackendError> {
        Err(self.no_device_memory())
    }

    fn read(&self, _ptr: DevicePtr, _out: &mut [u8]) -> Result<(), BackendError> {
        Err(self.no_device_memory())
    }

    fn compile(&self, source: &KernelSource) -> Result<KernelHandle, BackendError> {
        let host = source.host().ok_or_else(|| BackendError::Compile {
            backend: format!("{}:{}", NUMERIC, self.index),
            kernel: source.name().to_string(),
            source_text: source.wasm().unwrap_or_default().to_string(),
            diagnostics: "kernel has no host rendition".to_string(),
        })?;
        let mut kernels = self.kernels.lock();
        kernels.push((source.name().to_string(), host.clone()));
        Ok(KernelHandle(kernels.len() - 1))
    }

    fn dispatch(
        &self,
        kernel: KernelHandle,
        args: &mut [DispatchArg<'_>],
        work_size: usize,
    ) -> Result<(), BackendError> {
        let backend = format!("{}:{}", NUMERIC, self.index);
        let (name, function) = self
            .kernels
            .lock()
            .get(kernel.0)
            .cloned()
            .ok_or_else(|| BackendError::InvalidKernel {
                backend: backend.clone(),
                kernel: format!("#{}", kernel.0),
            })?;

        if args.iter().any(|a| matches!(a, DispatchArg::Device(_))) {
            return Err(BackendError::Launch {
                backend,
                kernel: name,
                reason: "device pointer passed to a host kernel".to_string(),
            });
        }

        function(args, work_size).map_err(|reason| BackendError::Launch {
            backend,
            kernel: name,
            reason,
        })
    }

    fn live_allocations(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HostData;

    #[test]
    fn test_dispatch_runs_host_closure() {
        let driver = NumericDriver::new(0).unwrap();
        let source = KernelSource::new("fill").with_host(|args, n| {
            let value = args[1].scalar().ok_or("missing scalar")?;
            let out = args[0].host_mut().ok_or("missing buffer")?;
            out.copy_from_f64(&vec![value; n]);
            Ok(())
        });
        let handle = driver.compile(&source).unwrap();

        let mut data = HostData::F64(vec![0.0; 3]);
        let mut args = [DispatchArg::Host(&mut data), DispatchArg::Scalar(7.5)];
        driver.dispatch(handle, &mut args, 3).unwrap();
        assert_eq!(data, HostData::F64(vec![7.5; 3]));
    }

    #[test]
    fn test_kernel_error_becomes_launch_error() {
        let driver = NumericDriver::new(0).unwrap();
        let source = KernelSource::new("broken").with_host(|_, _| Err("boom".to_string()));
        let handle = driver.compile(&source).unwrap();
        let err = driver.dispatch(handle, &mut [], 1).unwrap_err();
        assert!(matches!(err, BackendError::Launch { ref reason, .. } if reason == "boom"));
    }

    #[test]
    fn test_has_no_device_memory() {
        let driver = NumericDriver::new(0).unwrap();
        assert!(driver.host_resident());
        assert!(driver.allocate(16).is_err());
        assert_eq!(driver.live_allocations(), 0);
    }
}
