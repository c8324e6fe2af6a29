//! Migration steps, plan resolution and progress reporting.
//!
//! A [`MigrationStep`] declares a transformation between two versions. Steps are
//! collected into a [`MigrationRegistry`]; for each migration request the registry
//! resolves a [`MigrationPlan`] that [`crate::Svip`] applies step by step.

mod info;
mod plan;
mod progress;
mod registry;
mod step;

pub use info::*;
pub use plan::*;
pub use progress::*;
pub use registry::*;
pub use step::*;
