// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // compute backends + registry
pub mod config;     // settings, workflow descriptions, builder
pub mod engine;     // workflow scheduler
pub mod errors;     // error handling
pub mod memory;     // host/device buffers
pub mod observability;
pub mod testing;    // cross-backend test helpers
pub mod traits;     // unit + driver abstractions
pub mod units;      // built-in unit library
pub mod utils;
