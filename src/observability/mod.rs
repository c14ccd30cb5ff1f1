// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Every diagnostic and operational log line in the crate goes through a
//! message struct in [`messages`]. Each struct implements `Display` for the
//! human-readable line and [`messages::StructuredLog`] to emit it with
//! structured fields at its fixed level.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::workflow` - scheduling, lifecycle and tick events
//! * `messages::backend` - registry, kernel compilation and launch events
//! * `messages::memory` - host/device synchronization of buffers
//! * `messages::validation` - configuration validation errors
//!
//! # Usage
//!
//! ```rust
//! use veles_core::observability::messages::workflow::TickCompleted;
//! use veles_core::observability::messages::StructuredLog;
//! use std::time::Duration;
//!
//! TickCompleted {
//!     tick: 3,
//!     units: 4,
//!     duration: Duration::from_millis(2),
//! }
//! .log();
//! ```

pub mod messages;
