// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Helpers for running the same test against every registered backend.
//!
//! ```
//! use std::sync::Arc;
//! use veles_core::backends::BackendRegistry;
//! use veles_core::testing::{backend_kinds, for_each_backend};
//!
//! # tokio_test_block(async {
//! let registry = Arc::new(BackendRegistry::with_builtin());
//! assert_eq!(backend_kinds(&registry, false), vec!["wasm".to_string()]);
//!
//! let visited = for_each_backend(&registry, true, |backend| async move {
//!     assert_eq!(backend.live_allocations(), 0);
//! })
//! .await;
//! assert_eq!(visited, vec!["numeric".to_string(), "wasm".to_string()]);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::future::Future;

use crate::backends::{Backend, BackendRegistry};

/// Registered kinds of the process-wide registry whose device 0 can be
/// created. Host-resident kinds are included only with `include_host`.
pub fn available_backends(include_host: bool) -> Vec<String> {
    backend_kinds(&BackendRegistry::global(), include_host)
}

/// Like [`available_backends`], for an explicit registry.
pub fn backend_kinds(registry: &BackendRegistry, include_host: bool) -> Vec<String> {
    registry
        .kinds()
        .into_iter()
        .filter(|kind| match registry.create(kind, 0) {
            Ok(backend) => include_host || !backend.is_host_resident(),
            Err(_) => false,
        })
        .collect()
}

/// Run `test` once per available kind with that kind's device 0, then
/// check the backend holds no allocations. Returns the kinds visited.
///
/// # Panics
/// When a backend reports live allocations after its test.
pub async fn for_each_backend<F, Fut>(
    registry: &BackendRegistry,
    include_host: bool,
    mut test: F,
) -> Vec<String>
where
    F: FnMut(Backend) -> Fut,
    Fut: Future<Output = ()>,
{
    let kinds = backend_kinds(registry, include_host);
    for kind in &kinds {
        let Ok(backend) = registry.create(kind, 0) else {
            continue;
        };
        tracing::debug!(backend = %backend.id(), "running backend test");
        test(backend.clone()).await;
        assert_no_leaks(&backend);
    }
    kinds
}

/// # Panics
/// When `backend` still holds device allocations.
pub fn assert_no_leaks(backend: &Backend) {
    let live = backend.live_allocations();
    assert!(
        live == 0,
        "backend {} leaked {} device allocation(s)",
        backend.id(),
        live
    );
}
