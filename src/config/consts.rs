// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Backend kind used by units requesting `auto` when `engine.backend` is unset
pub const DEFAULT_BACKEND: &str = "numeric";
/// Element type of undeclared slots when `common.precision_type` is unset
pub const DEFAULT_PRECISION: &str = "float";
/// Ticks run by the binary when neither the config nor the command line says
pub const DEFAULT_TICKS: u64 = 1;

/// Device indices offered by the wasm backend
pub const DEFAULT_WASM_DEVICES: usize = 2;
/// Initial wasm device memory, in 64 KiB pages (1 MiB)
pub const DEFAULT_WASM_INITIAL_PAGES: u32 = 16;
/// Wasm device memory ceiling, in 64 KiB pages (64 MiB)
pub const DEFAULT_WASM_MAX_PAGES: u32 = 1024;

/// Default fuel per work item (100 million instructions)
pub const DEFAULT_FUEL_LEVEL: u64 = 100_000_000;
/// Minimum allowed fuel per work item (1 million instructions)
pub const MIN_FUEL_LEVEL: u64 = 1_000_000;
/// Maximum allowed fuel per work item (5 billion instructions)
pub const MAX_FUEL_LEVEL: u64 = 5_000_000_000;
