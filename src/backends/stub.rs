// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::backends::KernelSource;
use crate::engine::{InitContext, RunContext};
use crate::errors::{BackendError, UnitError};
use crate::memory::{Shape, SlotSpec};
use crate::traits::{BackendDriver, DevicePtr, DispatchArg, KernelHandle, Unit};

/// Counters shared between a [`RecordingDriver`] and the test holding it.
#[derive(Debug, Default)]
pub struct RecordingLog {
    writes: AtomicUsize,
    reads: AtomicUsize,
    allocations: AtomicUsize,
    dispatches: AtomicUsize,
}

impl RecordingLog {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }
}

struct RecordingInner {
    kind: String,
    index: usize,
    memory: Mutex<HashMap<u64, Vec<u8>>>,
    next_ptr: Mutex<u64>,
    log: Arc<RecordingLog>,
}

/// A device whose memory is a host map. Counts every transfer so tests can
/// assert when data actually moved. Dispatch does nothing.
#[derive(Clone)]
pub struct RecordingDriver {
    inner: Arc<RecordingInner>,
}

impl RecordingDriver {
    pub fn new(kind: &str, index: usize) -> (Self, Arc<RecordingLog>) {
        let log = Arc::new(RecordingLog::default());
        let driver = Self {
            inner: Arc::new(RecordingInner {
                kind: kind.to_string(),
                index,
                memory: Mutex::new(HashMap::new()),
                next_ptr: Mutex::new(16),
                log: log.clone(),
            }),
        };
        (driver, log)
    }

    fn missing(&self, ptr: DevicePtr) -> BackendError {
        BackendError::Transfer {
            backend: format!("{}:{}", self.inner.kind, self.inner.index),
            reason: format!("{} is not allocated", ptr),
        }
    }
}

impl BackendDriver for RecordingDriver {
    fn kind(&self) -> &str {
        &self.inner.kind
    }

    fn index(&self) -> usize {
        self.inner.index
    }

    fn allocate(&self, bytes: usize) -> Result<DevicePtr, BackendError> {
        let mut next = self.inner.next_ptr.lock();
        let ptr = *next;
        *next += bytes.max(1) as u64;
        self.inner.memory.lock().insert(ptr, vec![0; bytes]);
        self.inner.log.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(DevicePtr(ptr))
    }

    fn free(&self, ptr: DevicePtr) -> Result<(), BackendError> {
        self.inner
            .memory
            .lock()
            .remove(&ptr.0)
            .map(|_| ())
            .ok_or_else(|| self.missing(ptr))
    }

    fn write(&self, ptr: DevicePtr, data: &[u8]) -> Result<(), BackendError> {
        let mut memory = self.inner.memory.lock();
        let block = memory.get_mut(&ptr.0).ok_or_else(|| self.missing(ptr))?;
        block[..data.len()].copy_from_slice(data);
        self.inner.log.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self, ptr: DevicePtr, out: &mut [u8]) -> Result<(), BackendError> {
        let memory = self.inner.memory.lock();
        let block = memory.get(&ptr.0).ok_or_else(|| self.missing(ptr))?;
        out.copy_from_slice(&block[..out.len()]);
        self.inner.log.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn compile(&self, _source: &KernelSource) -> Result<KernelHandle, BackendError> {
        Ok(KernelHandle(0))
    }

    fn dispatch(
        &self,
        _kernel: KernelHandle,
        _args: &mut [DispatchArg<'_>],
        _work_size: usize,
    ) -> Result<(), BackendError> {
        self.inner.log.dispatches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn live_allocations(&self) -> usize {
        self.inner.memory.lock().len()
    }
}

/// Lifecycle events recorded by the stub units, e.g. `"run:b"`.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Host unit whose single output is one more than the sum of its inputs.
/// A chain of N recording units therefore ends at N.
pub struct RecordingUnit {
    name: String,
    inputs: Vec<String>,
    log: EventLog,
}

impl RecordingUnit {
    pub fn new(name: &str, inputs: &[&str], log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Unit for RecordingUnit {
    fn type_name(&self) -> &'static str {
        "recording"
    }

    fn declare_inputs(&self) -> Vec<SlotSpec> {
        self.inputs.iter().map(SlotSpec::deferred).collect()
    }

    fn declare_outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::fixed("out", Shape::vector(1), None)]
    }

    async fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
        self.log.lock().push(format!("init:{}", self.name));
        Ok(())
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
        let mut total = 1.0;
        for slot in &self.inputs {
            total += ctx.input_f64(slot)?.iter().sum::<f64>();
        }
        ctx.write_output_f64("out", &[total])?;
        self.log.lock().push(format!("run:{}", self.name));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), UnitError> {
        self.log.lock().push(format!("stop:{}", self.name));
        Ok(())
    }
}

/// Where a [`FailingUnit`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Initialize,
    Tick(u64),
    Stop,
}

pub struct FailingUnit {
    name: String,
    at: FailAt,
    log: EventLog,
}

impl FailingUnit {
    pub fn new(name: &str, at: FailAt, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            at,
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Unit for FailingUnit {
    fn type_name(&self) -> &'static str {
        "failing"
    }

    fn declare_inputs(&self) -> Vec<SlotSpec> {
        Vec::new()
    }

    fn declare_outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::fixed("out", Shape::vector(1), None)]
    }

    async fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
        if self.at == FailAt::Initialize {
            return Err(UnitError::Failed(format!("{} refused to initialize", self.name)));
        }
        self.log.lock().push(format!("init:{}", self.name));
        Ok(())
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
        if self.at == FailAt::Tick(ctx.tick()) {
            return Err(UnitError::Failed(format!("{} failed on tick {}", self.name, ctx.tick())));
        }
        self.log.lock().push(format!("run:{}", self.name));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), UnitError> {
        self.log.lock().push(format!("stop:{}", self.name));
        if self.at == FailAt::Stop {
            return Err(UnitError::Failed(format!("{} failed to stop", self.name)));
        }
        Ok(())
    }
}

/// Sleeps through every run.
pub struct SlowUnit {
    delay: Duration,
}

impl SlowUnit {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Unit for SlowUnit {
    fn type_name(&self) -> &'static str {
        "slow"
    }

    fn declare_inputs(&self) -> Vec<SlotSpec> {
        Vec::new()
    }

    fn declare_outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::fixed("out", Shape::vector(1), None)]
    }

    async fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
        Ok(())
    }

    async fn run(&mut self, _ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Cancels the workflow it runs in when it reaches `tick`.
pub struct CancellingUnit {
    token: CancellationToken,
    tick: u64,
}

impl CancellingUnit {
    pub fn new(token: CancellationToken, tick: u64) -> Self {
        Self { token, tick }
    }
}

#[async_trait]
impl Unit for CancellingUnit {
    fn type_name(&self) -> &'static str {
        "cancelling"
    }

    fn declare_inputs(&self) -> Vec<SlotSpec> {
        Vec::new()
    }

    fn declare_outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::fixed("out", Shape::vector(1), None)]
    }

    async fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
        Ok(())
    }

    async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
        if ctx.tick() == self.tick {
            self.token.cancel();
        }
        Ok(())
    }
}
