// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use wasmtime::*;

use super::pool::{DevicePool, BASE_OFFSET};
use crate::backends::registry::WASM;
use crate::backends::KernelSource;
use crate::config::consts::{
    DEFAULT_FUEL_LEVEL, DEFAULT_WASM_DEVICES, DEFAULT_WASM_INITIAL_PAGES, DEFAULT_WASM_MAX_PAGES,
    MAX_FUEL_LEVEL, MIN_FUEL_LEVEL,
};
use crate::config::Settings;
use crate::errors::BackendError;
use crate::traits::{BackendDriver, DevicePtr, DispatchArg, KernelHandle};

const PAGE_SIZE: usize = 65536;
/// Name of the function every kernel module exports.
pub const KERNEL_EXPORT: &str = "kernel";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Param {
    I32,
    F32,
    F64,
}

struct CompiledKernel {
    name: String,
    func: Func,
    params: Vec<Param>,
}

struct WasmDevice {
    store: Store<()>,
    memory: Memory,
    pool: DevicePool,
    kernels: Vec<CompiledKernel>,
}

/// Virtual accelerator backed by a wasmtime store.
///
/// Device memory is one linear memory owned by the driver and imported by
/// every kernel module as `env.memory`. A kernel exports `kernel` taking the
/// work-item index as its first `i32` parameter, followed by one `i32`
/// address per buffer argument and one float per scalar argument. Dispatch
/// calls it once per work item.
pub struct WasmDriver {
    index: usize,
    engine: Engine,
    fuel: u64,
    device: Mutex<WasmDevice>,
}

impl WasmDriver {
    /// Settings read:
    /// * `engine.wasm.devices` - number of device indices offered (default 2)
    /// * `engine.wasm.initial_pages` / `engine.wasm.max_pages` - memory size in 64 KiB pages
    /// * `engine.wasm.fuel` - instruction budget per work item, clamped to the fuel bounds
    pub fn new(settings: &Settings, index: usize) -> Result<Self, BackendError> {
        let devices: usize = settings.get_or("engine.wasm.devices", DEFAULT_WASM_DEVICES);
        if index >= devices {
            return Err(BackendError::unavailable(
                WASM,
                index,
                format!("only {} devices configured", devices),
            ));
        }
        let initial_pages: u32 =
            settings.get_or("engine.wasm.initial_pages", DEFAULT_WASM_INITIAL_PAGES);
        let max_pages: u32 = settings.get_or("engine.wasm.max_pages", DEFAULT_WASM_MAX_PAGES);
        let fuel = settings
            .get_or("engine.wasm.fuel", DEFAULT_FUEL_LEVEL)
            .clamp(MIN_FUEL_LEVEL, MAX_FUEL_LEVEL);

        let unavailable = |e: anyhow::Error| BackendError::unavailable(WASM, index, e.to_string());

        let mut config = Config::new();
        config.consume_fuel(true);
        let engine = Engine::new(&config).map_err(unavailable)?;
        let mut store = Store::new(&engine, ());
        let memory = Memory::new(
            &mut store,
            MemoryType::new(initial_pages.max(1), Some(max_pages.max(initial_pages))),
        )
        .map_err(unavailable)?;
        let capacity = memory.data_size(&store);

        Ok(Self {
            index,
            engine,
            fuel,
            device: Mutex::new(WasmDevice {
                store,
                memory,
                pool: DevicePool::new(capacity),
                kernels: Vec::new(),
            }),
        })
    }

    fn name(&self) -> String {
        format!("{}:{}", WASM, self.index)
    }

    fn transfer_error(&self, reason: impl Into<String>) -> BackendError {
        BackendError::Transfer {
            backend: self.name(),
            reason: reason.into(),
        }
    }

    fn compile_error(&self, source: &KernelSource, text: &str, diagnostics: String) -> BackendError {
        BackendError::Compile {
            backend: self.name(),
            kernel: source.name().to_string(),
            source_text: text.to_string(),
            diagnostics,
        }
    }

    fn check_range(&self, device: &WasmDevice, ptr: DevicePtr, len: usize) -> Result<(), BackendError> {
        let size = device
            .pool
            .size_of(ptr.0 as usize)
            .ok_or_else(|| self.transfer_error(format!("{} is not a live allocation", ptr)))?;
        if len > size {
            return Err(self.transfer_error(format!(
                "{} bytes do not fit the {}-byte allocation at {}",
                len, size, ptr
            )));
        }
        Ok(())
    }
}

impl BackendDriver for WasmDriver {
    fn kind(&self) -> &str {
        WASM
    }

    fn index(&self) -> usize {
        self.index
    }

    fn allocate(&self, bytes: usize) -> Result<DevicePtr, BackendError> {
        if bytes == 0 {
            return Ok(DevicePtr::NULL);
        }
        let mut device = self.device.lock();
        if let Some(offset) = device.pool.allocate(bytes) {
            return Ok(DevicePtr(offset as u64));
        }

        let WasmDevice {
            store, memory, pool, ..
        } = &mut *device;
        let needed = pool.required_capacity(bytes).saturating_sub(pool.capacity());
        let pages = needed.div_ceil(PAGE_SIZE) as u64;
        if memory.grow(&mut *store, pages).is_ok() {
            pool.set_capacity(memory.data_size(&*store));
            if let Some(offset) = pool.allocate(bytes) {
                return Ok(DevicePtr(offset as u64));
            }
        }
        Err(BackendError::OutOfMemory {
            backend: self.name(),
            requested: bytes,
            available: pool.available(),
        })
    }

    fn free(&self, ptr: DevicePtr) -> Result<(), BackendError> {
        if ptr == DevicePtr::NULL {
            return Ok(());
        }
        self.device
            .lock()
            .pool
            .free(ptr.0 as usize)
            .map(|_| ())
            .ok_or_else(|| self.transfer_error(format!("double free of {}", ptr)))
    }

    fn write(&self, ptr: DevicePtr, data: &[u8]) -> Result<(), BackendError> {
        if data.is_empty() {
            return Ok(());
        }
        let mut device = self.device.lock();
        self.check_range(&device, ptr, data.len())?;
        let WasmDevice { store, memory, .. } = &mut *device;
        memory
            .write(&mut *store, ptr.0 as usize, data)
            .map_err(|e| self.transfer_error(e.to_string()))
    }

    fn read(&self, ptr: DevicePtr, out: &mut [u8]) -> Result<(), BackendError> {
        if out.is_empty() {
            return Ok(());
        }
        let device = self.device.lock();
        self.check_range(&device, ptr, out.len())?;
        device
            .memory
            .read(&device.store, ptr.0 as usize, out)
            .map_err(|e| self.transfer_error(e.to_string()))
    }

    fn compile(&self, source: &KernelSource) -> Result<KernelHandle, BackendError> {
        let text = source.wasm().ok_or_else(|| {
            self.compile_error(source, "", "kernel has no WebAssembly rendition".to_string())
        })?;
        let bytes = wat::parse_str(text).map_err(|e| self.compile_error(source, text, e.to_string()))?;
        let module =
            Module::new(&self.engine, &bytes).map_err(|e| self.compile_error(source, text, e.to_string()))?;

        let mut device = self.device.lock();
        let WasmDevice {
            store,
            memory,
            kernels,
            ..
        } = &mut *device;

        let mut linker: Linker<()> = Linker::new(&self.engine);
        linker
            .define(&*store, "env", "memory", *memory)
            .map_err(|e| self.compile_error(source, text, e.to_string()))?;
        store
            .set_fuel(self.fuel)
            .map_err(|e| self.compile_error(source, text, e.to_string()))?;
        let instance = linker
            .instantiate(&mut *store, &module)
            .map_err(|e| self.compile_error(source, text, e.to_string()))?;
        let func = instance.get_func(&mut *store, KERNEL_EXPORT).ok_or_else(|| {
            self.compile_error(source, text, format!("module does not export '{}'", KERNEL_EXPORT))
        })?;

        let ty = func.ty(&*store);
        if ty.results().len() != 0 {
            return Err(self.compile_error(source, text, "kernel must not return values".to_string()));
        }
        let params = ty
            .params()
            .map(|p| match p {
                ValType::I32 => Ok(Param::I32),
                ValType::F32 => Ok(Param::F32),
                ValType::F64 => Ok(Param::F64),
                other => Err(self.compile_error(
                    source,
                    text,
                    format!("unsupported kernel parameter type {}", other),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if params.first() != Some(&Param::I32) {
            return Err(self.compile_error(
                source,
                text,
                "first kernel parameter must be the i32 work-item index".to_string(),
            ));
        }

        kernels.push(CompiledKernel {
            name: source.name().to_string(),
            func,
            params,
        });
        Ok(KernelHandle(kernels.len() - 1))
    }

    fn dispatch(
        &self,
        kernel: KernelHandle,
        args: &mut [DispatchArg<'_>],
        work_size: usize,
    ) -> Result<(), BackendError> {
        let mut device = self.device.lock();
        let WasmDevice { store, kernels, .. } = &mut *device;
        let compiled = kernels.get(kernel.0).ok_or_else(|| BackendError::InvalidKernel {
            backend: self.name(),
            kernel: format!("#{}", kernel.0),
        })?;
        let launch_error = |reason: String| BackendError::Launch {
            backend: self.name(),
            kernel: compiled.name.clone(),
            reason,
        };

        if compiled.params.len() != args.len() + 1 {
            return Err(launch_error(format!(
                "kernel takes {} arguments, {} given",
                compiled.params.len() - 1,
                args.len()
            )));
        }

        let mut values = Vec::with_capacity(compiled.params.len());
        values.push(Val::I32(0));
        for (position, (arg, param)) in args.iter().zip(&compiled.params[1..]).enumerate() {
            let value = match (arg, param) {
                (DispatchArg::Device(ptr), Param::I32) => Val::I32(ptr.0 as i32),
                (DispatchArg::Scalar(v), Param::F64) => Val::F64(v.to_bits()),
                (DispatchArg::Scalar(v), Param::F32) => Val::F32((*v as f32).to_bits()),
                (DispatchArg::Host(_), _) => {
                    return Err(launch_error(format!(
                        "argument {} is a host buffer; device kernels take device pointers",
                        position
                    )))
                }
                (_, param) => {
                    return Err(launch_error(format!(
                        "argument {} does not match parameter type {:?}",
                        position, param
                    )))
                }
            };
            values.push(value);
        }

        for gid in 0..work_size {
            store
                .set_fuel(self.fuel)
                .map_err(|e| launch_error(e.to_string()))?;
            values[0] = Val::I32(gid as i32);
            compiled
                .func
                .call(&mut *store, &values, &mut [])
                .map_err(|e| launch_error(format!("work item {}: {}", gid, e)))?;
        }
        Ok(())
    }

    fn live_allocations(&self) -> usize {
        self.device.lock().pool.live()
    }
}

impl std::fmt::Debug for WasmDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let device = self.device.lock();
        f.debug_struct("WasmDriver")
            .field("index", &self.index)
            .field("capacity", &device.pool.capacity())
            .field("live_allocations", &device.pool.live())
            .field("kernels", &device.kernels.len())
            .field("base_offset", &BASE_OFFSET)
            .finish()
    }
}
