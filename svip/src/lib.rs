//! # SVIP - Semantic Versioning for application state
//!
//! SVIP keeps an application's persisted state (a database, a file store, any
//! structure that outlives the process) in step with the code that reads it.
//! Applications declare migration steps between versions; SVIP resolves the path
//! from the version the store is at to the version the code needs, captures a
//! backup through the store's backend, applies the steps one by one and restores
//! the backup automatically if any step fails.
//!
//! ## Quick Start
//!
//! ```rust
//! use svip::backend::MemoryBackend;
//! use svip::errors::SvipResult;
//! use svip::migration::MigrateOptions;
//! use svip::Svip;
//! use std::collections::BTreeMap;
//!
//! # fn main() -> SvipResult<()> {
//! let backend: MemoryBackend<u32, BTreeMap<String, String>> = MemoryBackend::new(BTreeMap::new());
//!
//! let svip = Svip::builder(backend.clone())
//!     .add_migration(0, 1, |state| {
//!         state.write().insert("name".to_string(), "svip".to_string());
//!         Ok(state)
//!     })
//!     .build()?;
//!
//! let result = svip.migrate(&1, MigrateOptions::default())?;
//! assert_eq!(result.steps_applied(), 1);
//! assert_eq!(svip.current_version()?, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Design
//!
//! - The version marker is owned by the backend. [`Svip`] re-reads it on every call
//!   and never caches it, so a process restarted after a crash resumes from the
//!   last version the backend durably persisted.
//! - Backends are plugged in through the [`backend::AppStateBackend`] capability trait.
//! - Progress is reported through [`migration::ProgressReporter`] callbacks, only
//!   when a migration runs verbose.
//!
//! ## Module Organization
//!
//! - [`backend`] - Backend contract, backup handles and the in-memory backend
//! - [`errors`] - Error types and result definitions
//! - [`migration`] - Steps, plans, resolution and progress reporting
//! - [`svip`] - The migration orchestrator
//! - [`svip_builder`] - Builder for the orchestrator
//! - [`svip_config`] - Orchestrator configuration
//! - [`version`] - Version trait, direction and the semantic version type
//! - `cli` - Command surface for host applications (feature `cli`)

pub mod backend;
pub mod common;
pub mod errors;
pub mod migration;
pub mod svip;
pub mod svip_builder;
pub mod svip_config;
pub mod version;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::svip::Svip;
pub use crate::version::{Direction, SchemaVersion, SemanticVersion, Version};
pub use semver::VersionReq;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    colog::init();
}
