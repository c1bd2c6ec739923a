//! Common imports shared across the crate, mirroring the rest of this codebase's
//! thin `prelude` convention so modules don't repeat the same `use` block.

pub use anyhow::{Context, Result, anyhow, bail};
pub use log::{debug, error, info, trace, warn};
