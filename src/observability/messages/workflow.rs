// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for workflow lifecycle and execution events.
//!
//! This module contains message types for logging events related to:
//! * Scheduling order and unit initialization
//! * Tick execution (start, completion, failure)
//! * Cancellation and teardown

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Workflow initialization started with a resolved order.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use veles_core::observability::messages::workflow::WorkflowInitializing;
///
/// let order = vec!["source", "double"];
/// let msg = WorkflowInitializing { order: &order };
///
/// tracing::info!("{}", msg);
/// ```
pub struct WorkflowInitializing<'a> {
    pub order: &'a [&'a str],
}

impl Display for WorkflowInitializing<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Initializing workflow of {} units in order: {}",
            self.order.len(),
            self.order.join(" -> ")
        )
    }
}

impl StructuredLog for WorkflowInitializing<'_> {
    fn log(&self) {
        tracing::info!(
            unit_count = self.order.len(),
            order = self.order.join(","),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "workflow_initialize",
            span_name = name,
            unit_count = self.order.len(),
        )
    }
}

/// A unit finished initialization.
///
/// # Log Level
/// `debug!`
pub struct UnitInitialized<'a> {
    pub unit: &'a str,
    pub type_name: &'a str,
    pub backend: Option<&'a str>,
}

impl Display for UnitInitialized<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.backend {
            Some(backend) => write!(
                f,
                "Initialized unit '{}' ({}) on {}",
                self.unit, self.type_name, backend
            ),
            None => write!(f, "Initialized unit '{}' ({}) on host", self.unit, self.type_name),
        }
    }
}

impl StructuredLog for UnitInitialized<'_> {
    fn log(&self) {
        tracing::debug!(
            unit = self.unit,
            type_name = self.type_name,
            backend = self.backend.unwrap_or("host"),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("unit", span_name = name, unit = self.unit)
    }
}

/// A tick started.
///
/// # Log Level
/// `debug!` - One per tick
pub struct TickStarted {
    pub tick: u64,
    pub units: usize,
}

impl Display for TickStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Starting tick {} over {} units", self.tick, self.units)
    }
}

impl StructuredLog for TickStarted {
    fn log(&self) {
        tracing::debug!(tick = self.tick, units = self.units, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("tick", span_name = name, tick = self.tick)
    }
}

/// A tick completed successfully.
///
/// # Log Level
/// `debug!` - One per tick
pub struct TickCompleted {
    pub tick: u64,
    pub units: usize,
    pub duration: Duration,
}

impl Display for TickCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Completed tick {} ({} units) in {:?}",
            self.tick, self.units, self.duration
        )
    }
}

impl StructuredLog for TickCompleted {
    fn log(&self) {
        tracing::debug!(
            tick = self.tick,
            units = self.units,
            duration_us = self.duration.as_micros() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("tick", span_name = name, tick = self.tick)
    }
}

/// A unit failed during a tick.
///
/// # Log Level
/// `error!` - Stops the workflow
pub struct UnitRunFailed<'a> {
    pub unit: &'a str,
    pub tick: u64,
    pub error: &'a dyn std::error::Error,
}

impl Display for UnitRunFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Unit '{}' failed on tick {}: {}",
            self.unit, self.tick, self.error
        )
    }
}

impl StructuredLog for UnitRunFailed<'_> {
    fn log(&self) {
        tracing::error!(
            unit = self.unit,
            tick = self.tick,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("unit", span_name = name, unit = self.unit, tick = self.tick)
    }
}

/// Cancellation observed between units.
///
/// # Log Level
/// `warn!`
pub struct WorkflowCancelled<'a> {
    pub tick: u64,
    pub next_unit: Option<&'a str>,
}

impl Display for WorkflowCancelled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.next_unit {
            Some(unit) => write!(f, "Workflow cancelled on tick {} before unit '{}'", self.tick, unit),
            None => write!(f, "Workflow cancelled on tick {}", self.tick),
        }
    }
}

impl StructuredLog for WorkflowCancelled<'_> {
    fn log(&self) {
        tracing::warn!(
            tick = self.tick,
            next_unit = self.next_unit.unwrap_or(""),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("workflow", span_name = name, tick = self.tick)
    }
}

/// A unit's `stop` returned an error during teardown.
///
/// # Log Level
/// `warn!` - Teardown continues with the remaining units
pub struct UnitTeardownFailed<'a> {
    pub unit: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for UnitTeardownFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Unit '{}' failed to stop: {}", self.unit, self.error)
    }
}

impl StructuredLog for UnitTeardownFailed<'_> {
    fn log(&self) {
        tracing::warn!(unit = self.unit, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("unit", span_name = name, unit = self.unit)
    }
}

/// Workflow reached `Stopped`.
///
/// # Log Level
/// `info!`
pub struct WorkflowStopped {
    pub ticks: u64,
    pub units_stopped: usize,
}

impl Display for WorkflowStopped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Workflow stopped after {} ticks ({} units torn down)",
            self.ticks, self.units_stopped
        )
    }
}

impl StructuredLog for WorkflowStopped {
    fn log(&self) {
        tracing::info!(
            ticks = self.ticks,
            units_stopped = self.units_stopped,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("workflow", span_name = name, ticks = self.ticks)
    }
}
