// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The views of the workflow a unit receives during `initialize` and `run`.
//!
//! A context exposes the unit's own output buffers for writing and its
//! linked producers' buffers for reading. Buffers owned by other units are
//! never handed out mutably, which is how the "write only what you own"
//! rule holds without runtime locks.

use crate::backends::{Backend, Kernel, KernelArg, KernelSource};
use crate::config::Settings;
use crate::errors::{MemoryError, UnitError};
use crate::memory::{
    Buffer, BufferArena, BufferId, BufferSpec, BufferWriteGuard, DType, Element, Shape, SlotSpec,
};

/// Everything a context needs to know about the unit it serves.
pub(crate) struct UnitScope<'a> {
    pub unit: &'a str,
    pub inputs: &'a [SlotSpec],
    pub outputs: &'a [SlotSpec],
    /// Producer buffer per input slot, in declaration order.
    pub input_ids: Vec<Option<BufferId>>,
    /// Owned buffer per output slot, in declaration order.
    pub output_ids: &'a [BufferId],
    pub arena: &'a mut BufferArena,
    pub backend: Option<&'a Backend>,
    pub settings: &'a Settings,
    pub precision: DType,
}

impl UnitScope<'_> {
    fn input_position(&self, slot: &str) -> Result<usize, UnitError> {
        self.inputs
            .iter()
            .position(|s| s.name == slot)
            .ok_or_else(|| UnitError::UnknownSlot(slot.to_string()))
    }

    fn output_position(&self, slot: &str) -> Result<usize, UnitError> {
        self.outputs
            .iter()
            .position(|s| s.name == slot)
            .ok_or_else(|| UnitError::UnknownSlot(slot.to_string()))
    }

    fn input_id(&self, slot: &str) -> Result<BufferId, UnitError> {
        let position = self.input_position(slot)?;
        self.input_ids[position].ok_or_else(|| UnitError::UnlinkedInput(slot.to_string()))
    }

    fn output_id(&self, slot: &str) -> Result<BufferId, UnitError> {
        Ok(self.output_ids[self.output_position(slot)?])
    }

    /// The producer's buffer, after checking it against a fixed declared shape.
    fn checked_input(&mut self, slot: &str) -> Result<&mut Buffer, UnitError> {
        let position = self.input_position(slot)?;
        let id = self.input_id(slot)?;
        let declared = self.inputs[position].fixed_shape().cloned();
        let buffer = self.arena.get_mut(id)?;
        if let Some(expected) = declared {
            if buffer.shape() != &expected {
                return Err(MemoryError::ShapeMismatch {
                    buffer: id,
                    name: buffer.name().to_string(),
                    expected,
                    actual: buffer.shape().clone(),
                }
                .into());
            }
        }
        Ok(buffer)
    }

    fn owned(&mut self, id: BufferId) -> Result<&mut Buffer, UnitError> {
        if !self.output_ids.contains(&id) {
            let name = self.arena.get(id)?.name().to_string();
            return Err(MemoryError::NotOwned {
                buffer: id,
                name,
                unit: self.unit.to_string(),
            }
            .into());
        }
        Ok(self.arena.get_mut(id)?)
    }

    fn output_dtype(&self, position: usize) -> DType {
        self.outputs[position].dtype.unwrap_or(self.precision)
    }

    fn backend(&self) -> Result<&Backend, UnitError> {
        self.backend.ok_or(UnitError::MissingBackend)
    }
}

/// Handed to [`crate::traits::Unit::initialize`].
pub struct InitContext<'a> {
    scope: UnitScope<'a>,
}

impl<'a> InitContext<'a> {
    pub(crate) fn new(scope: UnitScope<'a>) -> Self {
        Self { scope }
    }

    pub fn unit_name(&self) -> &str {
        self.scope.unit
    }

    pub fn settings(&self) -> &Settings {
        self.scope.settings
    }

    /// Element type for slots that do not declare one.
    pub fn precision(&self) -> DType {
        self.scope.precision
    }

    pub fn backend(&self) -> Result<&Backend, UnitError> {
        self.scope.backend()
    }

    /// Resolved shape and dtype of the producer linked to `slot`.
    pub fn input_spec(&self, slot: &str) -> Result<BufferSpec, UnitError> {
        let id = self.scope.input_id(slot)?;
        Ok(self.scope.arena.get(id)?.spec().clone())
    }

    pub fn output_spec(&self, slot: &str) -> Result<BufferSpec, UnitError> {
        let id = self.scope.output_id(slot)?;
        Ok(self.scope.arena.get(id)?.spec().clone())
    }

    pub fn output_id(&self, slot: &str) -> Result<BufferId, UnitError> {
        self.scope.output_id(slot)
    }

    /// Give an owned output its final shape, using the slot's dtype or the
    /// workflow precision. A slot declared with a fixed shape only accepts
    /// that shape. Resizing to the current spec keeps the contents.
    pub fn resize_output(&mut self, slot: &str, shape: impl Into<Shape>) -> Result<BufferSpec, UnitError> {
        let position = self.scope.output_position(slot)?;
        let spec = BufferSpec::new(shape, self.scope.output_dtype(position));
        let id = self.scope.output_ids[position];
        let buffer = self.scope.arena.get_mut(id)?;

        if let Some(fixed) = self.scope.outputs[position].fixed_shape() {
            if fixed != &spec.shape {
                return Err(MemoryError::ShapeMismatch {
                    buffer: id,
                    name: buffer.name().to_string(),
                    expected: fixed.clone(),
                    actual: spec.shape,
                }
                .into());
            }
        }
        if buffer.spec() != &spec {
            buffer.resize(spec.clone());
        }
        Ok(spec)
    }

    /// Compile a kernel on the unit's backend.
    pub fn compile(&self, source: &KernelSource) -> Result<Kernel, UnitError> {
        Ok(self.scope.backend()?.compile(source)?)
    }

    /// Seed an owned output during initialization.
    pub fn write_output_f64(&mut self, slot: &str, values: &[f64]) -> Result<(), UnitError> {
        let id = self.scope.output_id(slot)?;
        Ok(self.scope.owned(id)?.write_f64(values)?)
    }
}

/// One argument of [`RunContext::launch`], naming buffers by slot.
#[derive(Debug, Clone, Copy)]
pub enum LaunchArg<'s> {
    /// An input slot, read by the kernel.
    Input(&'s str),
    /// An owned output slot, fully overwritten by the kernel.
    Output(&'s str),
    /// An owned output slot the kernel reads and writes.
    Update(&'s str),
    Scalar(f64),
}

/// Handed to [`crate::traits::Unit::run`] once per tick.
pub struct RunContext<'a> {
    scope: UnitScope<'a>,
    tick: u64,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(scope: UnitScope<'a>, tick: u64) -> Self {
        Self { scope, tick }
    }

    /// Current tick, starting at 1.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn unit_name(&self) -> &str {
        self.scope.unit
    }

    pub fn settings(&self) -> &Settings {
        self.scope.settings
    }

    pub fn precision(&self) -> DType {
        self.scope.precision
    }

    pub fn backend(&self) -> Result<&Backend, UnitError> {
        self.scope.backend()
    }

    pub fn input_spec(&self, slot: &str) -> Result<BufferSpec, UnitError> {
        let id = self.scope.input_id(slot)?;
        Ok(self.scope.arena.get(id)?.spec().clone())
    }

    /// Map an input for reading, synchronizing it from its device if needed.
    pub fn input<T: Element>(&mut self, slot: &str) -> Result<&[T], UnitError> {
        Ok(self.scope.checked_input(slot)?.map_for_read::<T>()?)
    }

    /// An input's contents converted to `f64`, whatever its dtype.
    pub fn input_f64(&mut self, slot: &str) -> Result<Vec<f64>, UnitError> {
        Ok(self.scope.checked_input(slot)?.read_f64()?)
    }

    /// Map an owned output for overwriting.
    pub fn output<T: Element>(&mut self, slot: &str) -> Result<BufferWriteGuard<'_, T>, UnitError> {
        let id = self.scope.output_id(slot)?;
        Ok(self.scope.owned(id)?.map_for_write::<T>()?)
    }

    /// Overwrite an owned output from `f64` values.
    pub fn write_output_f64(&mut self, slot: &str, values: &[f64]) -> Result<(), UnitError> {
        let id = self.scope.output_id(slot)?;
        Ok(self.scope.owned(id)?.write_f64(values)?)
    }

    /// Direct access to a buffer by id; only buffers this unit owns.
    pub fn buffer_mut(&mut self, id: BufferId) -> Result<&mut Buffer, UnitError> {
        self.scope.owned(id)
    }

    /// Launch `kernel` on the unit's backend with buffers named by slot.
    pub fn launch(&mut self, kernel: &Kernel, args: &[LaunchArg<'_>], work_size: usize) -> Result<(), UnitError> {
        let backend = self.scope.backend()?.clone();

        let mut ids = Vec::new();
        for arg in args {
            match arg {
                LaunchArg::Input(slot) => {
                    self.scope.checked_input(slot)?;
                    ids.push(self.scope.input_id(slot)?);
                }
                LaunchArg::Output(slot) | LaunchArg::Update(slot) => {
                    ids.push(self.scope.output_id(slot)?)
                }
                LaunchArg::Scalar(_) => {}
            }
        }

        let mut buffers = self.scope.arena.get_many_mut(&ids)?.into_iter();
        let mut kernel_args = Vec::with_capacity(args.len());
        for arg in args {
            let kernel_arg = match arg {
                LaunchArg::Scalar(value) => KernelArg::Scalar(*value),
                other => {
                    let buffer = buffers
                        .next()
                        .ok_or_else(|| UnitError::Failed("launch argument mismatch".to_string()))?;
                    match other {
                        LaunchArg::Input(_) => KernelArg::read(buffer),
                        LaunchArg::Output(_) => KernelArg::write(buffer),
                        _ => KernelArg::read_write(buffer),
                    }
                }
            };
            kernel_args.push(kernel_arg);
        }

        Ok(backend.launch(kernel, &mut kernel_args, work_size)?)
    }
}
