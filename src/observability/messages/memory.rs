// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for buffer synchronization and device memory events.

use crate::errors::BackendError;
use crate::memory::{BufferId, BufferSpec};
use crate::observability::messages::StructuredLog;
use crate::traits::DevicePtr;
use std::fmt::{Display, Formatter};
use tracing::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    HostToDevice,
    DeviceToHost,
}

impl Display for SyncDirection {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SyncDirection::HostToDevice => write!(f, "host -> device"),
            SyncDirection::DeviceToHost => write!(f, "device -> host"),
        }
    }
}

/// Buffer contents copied between host and a device.
///
/// # Log Level
/// `trace!` - One per transfer, high volume
pub struct BufferSynchronized<'a> {
    pub buffer: BufferId,
    pub name: &'a str,
    pub backend: &'a str,
    pub direction: SyncDirection,
    pub bytes: usize,
}

impl Display for BufferSynchronized<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Synchronized {} ('{}') {} on {}: {} bytes",
            self.buffer, self.name, self.direction, self.backend, self.bytes
        )
    }
}

impl StructuredLog for BufferSynchronized<'_> {
    fn log(&self) {
        tracing::trace!(
            buffer = self.buffer.index(),
            name = self.name,
            backend = self.backend,
            direction = %self.direction,
            bytes = self.bytes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!(
            "buffer_sync",
            span_name = name,
            buffer = self.buffer.index(),
            backend = self.backend,
        )
    }
}

/// Buffer reshaped; both copies discarded.
///
/// # Log Level
/// `debug!` - Happens during initialization
pub struct BufferResized<'a> {
    pub buffer: BufferId,
    pub name: &'a str,
    pub from: &'a BufferSpec,
    pub to: &'a BufferSpec,
}

impl Display for BufferResized<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Resized {} ('{}') from {} to {}",
            self.buffer, self.name, self.from, self.to
        )
    }
}

impl StructuredLog for BufferResized<'_> {
    fn log(&self) {
        tracing::debug!(
            buffer = self.buffer.index(),
            name = self.name,
            from = %self.from,
            to = %self.to,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "buffer_resize",
            span_name = name,
            buffer = self.buffer.index(),
        )
    }
}

/// Device memory could not be returned to its pool.
///
/// # Log Level
/// `warn!` - Leaks device memory but does not fail the caller
pub struct DeviceReleaseFailed<'a> {
    pub backend: &'a str,
    pub ptr: DevicePtr,
    pub error: &'a BackendError,
}

impl Display for DeviceReleaseFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to release device allocation {} on {}: {}",
            self.ptr, self.backend, self.error
        )
    }
}

impl StructuredLog for DeviceReleaseFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            backend = self.backend,
            ptr = self.ptr.0,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("device_release", span_name = name, backend = self.backend)
    }
}
