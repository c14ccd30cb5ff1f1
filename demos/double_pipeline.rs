// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Builds `source → double → total` in code and runs it on every backend
//! that can be created on this machine.
//!
//! ```text
//! cargo run --example double_pipeline
//! ```

use std::sync::Arc;

use veles_core::backends::BackendRegistry;
use veles_core::engine::Workflow;
use veles_core::errors::WorkflowError;
use veles_core::testing::backend_kinds;
use veles_core::traits::BackendRequest;
use veles_core::units::{ScaleUnit, SourceUnit, SumUnit};

async fn run_on(registry: Arc<BackendRegistry>, kind: &str) -> Result<(), WorkflowError> {
    let mut workflow = Workflow::new().with_registry(registry);
    workflow.add_unit("source", Box::new(SourceUnit::new(vec![1.0, 2.0, 3.0, 4.0])))?;
    workflow.add_unit(
        "double",
        Box::new(ScaleUnit::new(2.0).on_backend(BackendRequest::new(kind, 0))),
    )?;
    workflow.add_unit("total", Box::new(SumUnit::new()))?;
    workflow.link("double", "input", "source", "output")?;
    workflow.link("total", "input", "double", "output")?;

    workflow.initialize().await?;
    workflow.run(1).await?;

    println!("🔧 Backend: {}", kind);
    println!("   double → {:?}", workflow.read_output("double", "output")?);
    println!("   total  → {:?}", workflow.read_output("total", "sum")?);
    workflow.stop().await
}

#[tokio::main]
async fn main() {
    let registry = Arc::new(BackendRegistry::with_builtin());
    for kind in backend_kinds(&registry, true) {
        if let Err(e) = run_on(registry.clone(), &kind).await {
            eprintln!("❌ {} failed: {}", kind, e);
        }
    }
}
