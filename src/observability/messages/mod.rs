// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for consistent, human-readable
//! output and [`StructuredLog`] to log itself with structured fields.
//!
//! # Organization
//!
//! * `workflow` - workflow lifecycle and tick events
//! * `backend` - backend registry and kernel events
//! * `memory` - buffer synchronization events
//! * `validation` - configuration validation errors
//!
//! # Usage Pattern
//!
//! ```rust
//! use veles_core::observability::messages::backend::BackendCreated;
//! use veles_core::observability::messages::StructuredLog;
//!
//! let msg = BackendCreated {
//!     kind: "wasm",
//!     index: 0,
//! };
//!
//! let span = msg.span("backend_setup");
//! let _guard = span.enter();
//! msg.log();
//! ```

use tracing::Span;

pub mod backend;
pub mod memory;
pub mod validation;
pub mod workflow;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog: std::fmt::Display {
    /// Emit the message at its level with structured fields.
    fn log(&self);

    /// A span carrying the message's fields, for scoping nested events.
    fn span(&self, name: &str) -> Span;
}
