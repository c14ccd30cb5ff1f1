// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The workflow: owner of every unit and buffer, and the scheduler that
//! drives them.
//!
//! # Lifecycle
//!
//! ```text
//! Built ──link──▶ Linked ──initialize──▶ Initialized ──run_tick──▶ Running
//!                                                                    │
//!                          Stopped ◀──── stop / first failure ───────┘
//! ```
//!
//! Links are a relation table: each input slot records the index of its
//! producer and the producer's output [`BufferId`]. The workflow is the only
//! owner of units and buffers.
//!
//! Every tick runs the whole graph in the cached topological order. The
//! order is recomputed only after `add_unit` or `link`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backends::{Backend, BackendRegistry};
use crate::config::consts::DEFAULT_BACKEND;
use crate::config::Settings;
use crate::engine::context::{InitContext, RunContext, UnitScope};
use crate::engine::topology::topological_order;
use crate::errors::{MemoryError, UnitError, WorkflowError};
use crate::memory::{Buffer, BufferArena, BufferId, BufferSpec, DType, Shape, ShapeSpec, SlotSpec};
use crate::observability::messages::validation::CyclicDependencyDetected;
use crate::observability::messages::workflow::{
    TickCompleted, TickStarted, UnitInitialized, UnitRunFailed, UnitTeardownFailed,
    WorkflowCancelled, WorkflowInitializing, WorkflowStopped,
};
use crate::observability::messages::StructuredLog;
use crate::traits::Unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Built,
    Linked,
    Initialized,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
struct Binding {
    source_unit: usize,
    buffer: BufferId,
}

struct UnitEntry {
    name: String,
    unit: Box<dyn Unit>,
    inputs: Vec<SlotSpec>,
    outputs: Vec<SlotSpec>,
    /// Producer per input slot, aligned with `inputs`.
    bindings: Vec<Option<Binding>>,
    /// Owned buffer per output slot, aligned with `outputs`.
    output_ids: Vec<BufferId>,
    backend: Option<Backend>,
    initialized: bool,
}

impl UnitEntry {
    fn input_position(&self, slot: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.name == slot)
    }

    fn output_position(&self, slot: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.name == slot)
    }
}

pub struct Workflow {
    units: Vec<UnitEntry>,
    index: HashMap<String, usize>,
    arena: BufferArena,
    order: Option<Vec<usize>>,
    state: WorkflowState,
    tick: u64,
    registry: Arc<BackendRegistry>,
    settings: Settings,
    precision: DType,
    cancel: CancellationToken,
    unit_timeout: Option<Duration>,
    forced_backend: Option<String>,
}

impl Workflow {
    /// An empty workflow using the process-wide backend registry and
    /// default settings.
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Settings read:
    /// * `common.precision_type` - dtype of slots that do not declare one
    /// * `engine.unit_timeout_ms` - per-unit `run` deadline
    /// * `engine.backend` - kind used by units requesting `auto`
    pub fn with_settings(settings: Settings) -> Self {
        let unit_timeout = settings
            .get::<u64>("engine.unit_timeout_ms")
            .ok()
            .flatten()
            .map(Duration::from_millis);
        Self {
            units: Vec::new(),
            index: HashMap::new(),
            arena: BufferArena::new(),
            order: None,
            state: WorkflowState::Built,
            tick: 0,
            registry: BackendRegistry::global(),
            precision: settings.precision(),
            settings,
            cancel: CancellationToken::new(),
            unit_timeout,
            forced_backend: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<BackendRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = Some(timeout);
        self
    }

    /// Run every backend-requesting unit on `kind`, whatever it asked for.
    pub fn force_backend(mut self, kind: impl Into<String>) -> Self {
        self.forced_backend = Some(kind.into());
        self
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Number of ticks started so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn precision(&self) -> DType {
        self.precision
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// A token that stops the run loop from another task. Cancellation is
    /// observed between units, never in the middle of one.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    pub fn add_unit(&mut self, name: impl Into<String>, unit: Box<dyn Unit>) -> Result<(), WorkflowError> {
        self.require_building("Built or Linked")?;
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(WorkflowError::DuplicateUnit { name });
        }

        let inputs = unit.declare_inputs();
        let outputs = unit.declare_outputs();
        let output_ids = outputs
            .iter()
            .map(|slot| {
                let dtype = slot.dtype.unwrap_or(self.precision);
                let shape = match &slot.shape {
                    ShapeSpec::Fixed(shape) => shape.clone(),
                    ShapeSpec::Deferred => Shape::vector(0),
                };
                self.arena
                    .allocate(format!("{}.{}", name, slot.name), BufferSpec::new(shape, dtype))
            })
            .collect();

        self.index.insert(name.clone(), self.units.len());
        self.units.push(UnitEntry {
            name,
            unit,
            bindings: vec![None; inputs.len()],
            inputs,
            outputs,
            output_ids,
            backend: None,
            initialized: false,
        });
        self.order = None;
        Ok(())
    }

    /// Feed `source_unit.source_slot` into `unit.slot`. Relinking a slot
    /// replaces its previous producer.
    pub fn link(
        &mut self,
        unit: &str,
        slot: &str,
        source_unit: &str,
        source_slot: &str,
    ) -> Result<(), WorkflowError> {
        self.require_building("Built or Linked")?;
        let consumer = self.unit_index(unit)?;
        let producer = self.unit_index(source_unit)?;

        let input = self.units[consumer]
            .input_position(slot)
            .ok_or_else(|| WorkflowError::UnknownSlot {
                unit: unit.to_string(),
                slot: slot.to_string(),
            })?;
        let output = self.units[producer]
            .output_position(source_slot)
            .ok_or_else(|| WorkflowError::UnknownSlot {
                unit: source_unit.to_string(),
                slot: source_slot.to_string(),
            })?;

        let consumer_slot = &self.units[consumer].inputs[input];
        let producer_slot = &self.units[producer].outputs[output];
        let buffer = self.units[producer].output_ids[output];

        let expected = consumer_slot.dtype.unwrap_or(self.precision);
        let actual = self.arena.get(buffer)?.dtype();
        if expected != actual {
            return Err(WorkflowError::LinkTypeError {
                unit: unit.to_string(),
                slot: slot.to_string(),
                source_unit: source_unit.to_string(),
                source_slot: source_slot.to_string(),
                expected,
                actual,
            });
        }

        if let (Some(expected), Some(actual)) = (consumer_slot.fixed_shape(), producer_slot.fixed_shape()) {
            if expected != actual {
                return Err(WorkflowError::ShapeMismatch {
                    unit: unit.to_string(),
                    slot: slot.to_string(),
                    producer: format!("{}.{}", source_unit, source_slot),
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }

        self.units[consumer].bindings[input] = Some(Binding {
            source_unit: producer,
            buffer,
        });
        self.order = None;
        self.state = WorkflowState::Linked;
        Ok(())
    }

    /// Execution order as unit names. Fails on a cycle.
    pub fn order(&mut self) -> Result<Vec<&str>, WorkflowError> {
        let order = self.resolve_order()?;
        Ok(order.iter().map(|i| self.units[*i].name.as_str()).collect())
    }

    /// Resolve the order, every backend, and initialize each unit in order.
    ///
    /// Nothing is initialized when the graph has a cycle, an unlinked
    /// input, or a backend that cannot be created. When a unit fails to
    /// initialize, the units initialized before it are stopped in reverse
    /// order and the workflow ends `Stopped`.
    pub async fn initialize(&mut self) -> Result<(), WorkflowError> {
        self.require_building("Built or Linked")?;
        let order = self.resolve_order()?;

        for &i in &order {
            let entry = &self.units[i];
            if let Some(position) = entry.bindings.iter().position(|b| b.is_none()) {
                return Err(WorkflowError::UnlinkedInput {
                    unit: entry.name.clone(),
                    slot: entry.inputs[position].name.clone(),
                });
            }
        }

        let mut backends = Vec::with_capacity(order.len());
        for &i in &order {
            let backend = self.resolve_backend(&self.units[i])
                .map_err(|e| WorkflowError::initialization(&self.units[i].name, e))?;
            backends.push((i, backend));
        }
        for (i, backend) in backends {
            self.units[i].backend = backend;
        }

        let names: Vec<&str> = order.iter().map(|i| self.units[*i].name.as_str()).collect();
        let start = WorkflowInitializing { order: &names };
        let span = start.span("workflow_initialize");
        start.log();

        for &i in &order {
            if let Err(error) = self.initialize_unit(i).instrument(span.clone()).await {
                let unit = self.units[i].name.clone();
                self.shutdown().await;
                return Err(WorkflowError::initialization(&unit, error));
            }
        }

        self.state = WorkflowState::Initialized;
        Ok(())
    }

    /// Run every unit once, in order.
    ///
    /// The first unit failure aborts the tick, stops the workflow and is
    /// returned with the unit's name and the tick number.
    pub async fn run_tick(&mut self) -> Result<(), WorkflowError> {
        match self.state {
            WorkflowState::Initialized | WorkflowState::Running => {}
            actual => {
                return Err(WorkflowError::InvalidState {
                    expected: "Initialized or Running",
                    actual,
                })
            }
        }
        let order = self.resolve_order()?;
        self.state = WorkflowState::Running;
        self.tick += 1;
        let tick = self.tick;

        let started = TickStarted {
            tick,
            units: order.len(),
        };
        let span = started.span("tick");
        started.log();
        let start = Instant::now();

        for &i in &order {
            if self.cancel.is_cancelled() {
                WorkflowCancelled {
                    tick,
                    next_unit: Some(self.units[i].name.as_str()),
                }
                .log();
                self.shutdown().await;
                return Err(WorkflowError::Cancelled { tick });
            }

            if let Err(error) = self.run_unit(i, tick).instrument(span.clone()).await {
                let unit = self.units[i].name.clone();
                UnitRunFailed {
                    unit: &unit,
                    tick,
                    error: &error,
                }
                .log();
                self.shutdown().await;
                return Err(WorkflowError::RunFailure {
                    unit,
                    tick,
                    source: error,
                });
            }
        }

        TickCompleted {
            tick,
            units: order.len(),
            duration: start.elapsed(),
        }
        .log();
        Ok(())
    }

    /// Run `ticks` ticks, stopping early on failure or cancellation.
    /// Returns the number of ticks completed by this call.
    pub async fn run(&mut self, ticks: u64) -> Result<u64, WorkflowError> {
        for completed in 0..ticks {
            if self.cancel.is_cancelled() {
                let tick = self.tick;
                WorkflowCancelled {
                    tick,
                    next_unit: None,
                }
                .log();
                self.shutdown().await;
                return if completed == 0 {
                    Err(WorkflowError::Cancelled { tick })
                } else {
                    Ok(completed)
                };
            }
            self.run_tick().await?;
        }
        Ok(ticks)
    }

    /// Stop every initialized unit in reverse order and release device memory.
    ///
    /// Teardown continues past failing units; the first failure is returned
    /// afterwards. Stopping a stopped workflow is a no-op.
    pub async fn stop(&mut self) -> Result<(), WorkflowError> {
        if self.state == WorkflowState::Stopped {
            return Ok(());
        }
        match self.shutdown().await {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub fn output_id(&self, unit: &str, slot: &str) -> Result<BufferId, WorkflowError> {
        let entry = &self.units[self.unit_index(unit)?];
        let position = entry
            .output_position(slot)
            .ok_or_else(|| WorkflowError::UnknownSlot {
                unit: unit.to_string(),
                slot: slot.to_string(),
            })?;
        Ok(entry.output_ids[position])
    }

    pub fn buffer(&self, id: BufferId) -> Result<&Buffer, WorkflowError> {
        Ok(self.arena.get(id)?)
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> Result<&mut Buffer, WorkflowError> {
        Ok(self.arena.get_mut(id)?)
    }

    /// Contents of an output, synchronized to the host, as `f64`.
    pub fn read_output(&mut self, unit: &str, slot: &str) -> Result<Vec<f64>, WorkflowError> {
        let id = self.output_id(unit, slot)?;
        Ok(self.arena.get_mut(id)?.read_f64()?)
    }

    /// Every output as `{unit: {slot: nested array}}`.
    pub fn materialize_outputs(&mut self) -> Result<serde_json::Value, WorkflowError> {
        let mut root = serde_json::Map::new();
        for entry in &self.units {
            let mut slots = serde_json::Map::new();
            for (slot, id) in entry.outputs.iter().zip(&entry.output_ids) {
                slots.insert(slot.name.clone(), self.arena.get_mut(*id)?.materialize()?);
            }
            root.insert(entry.name.clone(), serde_json::Value::Object(slots));
        }
        Ok(serde_json::Value::Object(root))
    }

    /// Bring every buffer to the host and release all device memory, for
    /// independent runs of the same workflow.
    pub fn reset_buffers(&mut self) -> Result<(), WorkflowError> {
        Ok(self.arena.reset_all()?)
    }

    /// Device allocations currently held by this workflow's buffers.
    pub fn device_allocations(&self) -> usize {
        self.arena.device_allocations()
    }

    /// The backend resolved for `unit` during initialization.
    pub fn backend_of(&self, unit: &str) -> Result<Option<&Backend>, WorkflowError> {
        Ok(self.units[self.unit_index(unit)?].backend.as_ref())
    }

    fn require_building(&self, expected: &'static str) -> Result<(), WorkflowError> {
        match self.state {
            WorkflowState::Built | WorkflowState::Linked => Ok(()),
            actual => Err(WorkflowError::InvalidState { expected, actual }),
        }
    }

    fn unit_index(&self, name: &str) -> Result<usize, WorkflowError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| WorkflowError::UnknownUnit {
                name: name.to_string(),
            })
    }

    fn edges(&self) -> Vec<(usize, usize)> {
        self.units
            .iter()
            .enumerate()
            .flat_map(|(consumer, entry)| {
                entry
                    .bindings
                    .iter()
                    .flatten()
                    .map(move |b| (b.source_unit, consumer))
            })
            .collect()
    }

    fn resolve_order(&mut self) -> Result<Vec<usize>, WorkflowError> {
        if let Some(order) = &self.order {
            return Ok(order.clone());
        }
        match topological_order(self.units.len(), &self.edges()) {
            Ok(order) => {
                self.order = Some(order.clone());
                Ok(order)
            }
            Err(cycle) => {
                let names: Vec<&str> = cycle.iter().map(|i| self.units[*i].name.as_str()).collect();
                CyclicDependencyDetected { cycle: &names }.log();
                Err(WorkflowError::CyclicDependency {
                    cycle: names.iter().map(|n| n.to_string()).collect(),
                })
            }
        }
    }

    fn resolve_backend(&self, entry: &UnitEntry) -> Result<Option<Backend>, UnitError> {
        let Some(request) = entry.unit.backend_request() else {
            return Ok(None);
        };
        let kind = match &self.forced_backend {
            Some(kind) => kind.clone(),
            None if request.is_auto() => self
                .settings
                .get_or("engine.backend", DEFAULT_BACKEND.to_string()),
            None => request.kind.clone(),
        };
        Ok(Some(self.registry.create(&kind, request.index)?))
    }

    fn scope(&mut self, i: usize) -> (&mut Box<dyn Unit>, UnitScope<'_>) {
        let Workflow {
            units,
            arena,
            settings,
            precision,
            ..
        } = self;
        let entry = &mut units[i];
        let scope = UnitScope {
            unit: &entry.name,
            inputs: &entry.inputs,
            outputs: &entry.outputs,
            input_ids: entry
                .bindings
                .iter()
                .map(|b| b.as_ref().map(|b| b.buffer))
                .collect(),
            output_ids: &entry.output_ids,
            arena,
            backend: entry.backend.as_ref(),
            settings,
            precision: *precision,
        };
        (&mut entry.unit, scope)
    }

    async fn initialize_unit(&mut self, i: usize) -> Result<(), UnitError> {
        let (unit, scope) = self.scope(i);
        let mut ctx = InitContext::new(scope);
        unit.initialize(&mut ctx).await?;

        let entry = &mut self.units[i];
        entry.initialized = true;
        let backend = entry.backend.as_ref().map(|b| b.id().to_string());
        UnitInitialized {
            unit: &entry.name,
            type_name: entry.unit.type_name(),
            backend: backend.as_deref(),
        }
        .log();
        Ok(())
    }

    async fn run_unit(&mut self, i: usize, tick: u64) -> Result<(), UnitError> {
        let timeout = self.unit_timeout;
        let (unit, scope) = self.scope(i);
        let mut ctx = RunContext::new(scope, tick);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, unit.run(&mut ctx))
                .await
                .map_err(|_| UnitError::Timeout(limit))?,
            None => unit.run(&mut ctx).await,
        }
    }

    /// Stop initialized units in reverse order, release device memory and
    /// enter `Stopped`. Returns the first teardown failure.
    async fn shutdown(&mut self) -> Option<WorkflowError> {
        let order = self
            .order
            .clone()
            .unwrap_or_else(|| (0..self.units.len()).collect());
        let mut first_error = None;
        let mut stopped = 0;

        for &i in order.iter().rev() {
            let entry = &mut self.units[i];
            if !entry.initialized {
                continue;
            }
            entry.initialized = false;
            stopped += 1;
            if let Err(error) = entry.unit.stop().await {
                UnitTeardownFailed {
                    unit: &entry.name,
                    error: &error,
                }
                .log();
                first_error.get_or_insert(WorkflowError::Teardown {
                    unit: entry.name.clone(),
                    source: error,
                });
            }
        }

        if let Err(error) = self.arena.reset_all() {
            first_error.get_or_insert(WorkflowError::Memory(error));
        }
        for entry in &self.units {
            if let Some(backend) = &entry.backend {
                if let Err(error) = backend.synchronize() {
                    first_error.get_or_insert(WorkflowError::Memory(MemoryError::Backend(error)));
                }
            }
        }

        self.state = WorkflowState::Stopped;
        WorkflowStopped {
            ticks: self.tick,
            units_stopped: stopped,
        }
        .log();
        first_error
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("state", &self.state)
            .field("tick", &self.tick)
            .field("units", &self.unit_names())
            .field("buffers", &self.arena.len())
            .finish()
    }
}
