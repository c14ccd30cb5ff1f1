// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod context;
pub mod topology;
pub mod workflow;
#[cfg(test)]
pub mod integration_tests;

pub use context::{InitContext, LaunchArg, RunContext};
pub use workflow::{Workflow, WorkflowState};
