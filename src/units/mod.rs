// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in units.
//!
//! | type     | runs on          | inputs        | outputs            |
//! |----------|------------------|---------------|--------------------|
//! | `source` | host             | none          | `output`           |
//! | `scale`  | host or backend  | `input`       | `output`           |
//! | `add`    | backend          | `a`, `b`      | `output`           |
//! | `sum`    | host             | `input`       | `sum` (scalar)     |
//!
//! Units are created by type name through [`UnitRegistry`], which is how
//! workflow configuration files refer to them.

pub mod add;
pub mod registry;
pub mod scale;
pub mod source;
pub mod sum;

pub use add::AddUnit;
pub use registry::{UnitFactory, UnitOptions, UnitRegistry};
pub use scale::ScaleUnit;
pub use source::SourceUnit;
pub use sum::SumUnit;
