// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Validation of workflow descriptions before any unit is created.
//!
//! # Validation Pipeline
//!
//! 1. **Uniqueness**: every unit id appears once
//! 2. **References**: every input link is `unit.slot` and names a declared unit
//! 3. **Cycle Detection**: DFS over producer → consumer edges
//!
//! Cycle detection needs a well-formed graph, so it only runs when the
//! first two stages found nothing. Slot names are not checked here; the
//! workflow rejects unknown slots when it links them.
//!
//! # Example
//! ```rust
//! use veles_core::config::{validate_workflow_config, WorkflowConfig, ConfigFormat};
//! use veles_core::errors::ValidationError;
//!
//! let config = WorkflowConfig::parse(
//!     r#"
//! units:
//!   - { id: a, type: scale, inputs: { input: b.output } }
//!   - { id: b, type: scale, inputs: { input: a.output } }
//! "#,
//!     ConfigFormat::Yaml,
//! )?;
//!
//! let errors = validate_workflow_config(&config).unwrap_err();
//! assert!(matches!(errors[0], ValidationError::CyclicDependency { .. }));
//! # Ok::<(), veles_core::errors::ConfigError>(())
//! ```

use std::collections::{HashMap, HashSet};

use crate::config::loader::parse_link;
use crate::config::WorkflowConfig;
use crate::errors::ValidationError;
use crate::observability::messages::validation::{
    CyclicDependencyDetected, DuplicateUnitId, UnresolvedLink, ValidationFailed,
    ValidationStarted,
};
use crate::observability::messages::StructuredLog;

/// Validate a workflow description's link graph.
///
/// Accumulates every uniqueness and reference error so they can be fixed
/// in one pass; reports at most one cycle.
pub fn validate_workflow_config(config: &WorkflowConfig) -> Result<(), Vec<ValidationError>> {
    ValidationStarted {
        unit_count: config.units.len(),
    }
    .log();

    let mut errors = validate_unique_unit_ids(config);
    errors.extend(validate_link_references(config));

    if errors.is_empty() {
        errors.extend(validate_acyclic_graph(config));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        ValidationFailed {
            error_count: errors.len(),
        }
        .log();
        Err(errors)
    }
}

fn validate_unique_unit_ids(config: &WorkflowConfig) -> Vec<ValidationError> {
    let mut seen = HashSet::new();
    let mut errors = Vec::new();

    for unit in &config.units {
        if !seen.insert(unit.id.as_str()) {
            DuplicateUnitId { unit_id: &unit.id }.log();
            errors.push(ValidationError::DuplicateUnitId {
                unit_id: unit.id.clone(),
            });
        }
    }
    errors
}

fn validate_link_references(config: &WorkflowConfig) -> Vec<ValidationError> {
    let ids: HashSet<&str> = config.units.iter().map(|u| u.id.as_str()).collect();
    let mut errors = Vec::new();

    for unit in &config.units {
        for (slot, reference) in &unit.inputs {
            match parse_link(reference) {
                None => errors.push(ValidationError::MalformedLink {
                    unit_id: unit.id.clone(),
                    slot: slot.clone(),
                    reference: reference.clone(),
                }),
                Some((producer, _)) if !ids.contains(producer) => {
                    UnresolvedLink {
                        unit_id: &unit.id,
                        slot,
                        missing_unit: producer,
                    }
                    .log();
                    errors.push(ValidationError::UnresolvedLink {
                        unit_id: unit.id.clone(),
                        slot: slot.clone(),
                        missing_unit: producer.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
    }
    errors
}

/// Three-colour DFS over producer → consumer edges, visiting units in
/// declaration order so the reported cycle is stable.
fn validate_acyclic_graph(config: &WorkflowConfig) -> Vec<ValidationError> {
    let mut graph: HashMap<&str, Vec<&str>> = config
        .units
        .iter()
        .map(|u| (u.id.as_str(), Vec::new()))
        .collect();
    for unit in &config.units {
        for reference in unit.inputs.values() {
            if let Some((producer, _)) = parse_link(reference) {
                if let Some(consumers) = graph.get_mut(producer) {
                    consumers.push(unit.id.as_str());
                }
            }
        }
    }

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for unit in &config.units {
        if visited.contains(unit.id.as_str()) {
            continue;
        }
        if let Some(cycle) =
            dfs_cycle_detection(&unit.id, &graph, &mut visited, &mut rec_stack, &mut path)
        {
            CyclicDependencyDetected { cycle: &cycle }.log();
            return vec![ValidationError::CyclicDependency {
                cycle: cycle.iter().map(|s| s.to_string()).collect(),
            }];
        }
    }
    Vec::new()
}

fn dfs_cycle_detection<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<&'a str>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for &neighbor in graph.get(node).into_iter().flatten() {
        if !visited.contains(neighbor) {
            if let Some(cycle) = dfs_cycle_detection(neighbor, graph, visited, rec_stack, path) {
                return Some(cycle);
            }
        } else if rec_stack.contains(neighbor) {
            let start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(neighbor);
            return Some(cycle);
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}
