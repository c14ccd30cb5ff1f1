// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod builder;
mod loader;
mod settings;
mod validation;

pub mod consts;

pub use builder::WorkflowBuilder;
pub use loader::{
    load_and_validate_config, load_config, parse_link, ConfigFormat, UnitConfig, WorkflowConfig,
};
pub use settings::Settings;
pub use validation::validate_workflow_config;
