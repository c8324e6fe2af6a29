use crate::backend::AppStateBackend;
use crate::errors::{SvipError, SvipResult};
use crate::migration::{MigrationRegistry, MigrationStep, ProgressReporter};
use crate::svip::Svip;
use crate::svip_config::SvipConfig;
use crate::version::Version;
use std::sync::Arc;

/// Builder for a [`Svip`] orchestrator bound to a backend.
///
/// Registration errors (equal versions, duplicated steps) are captured on the
/// spot and reported by [`SvipBuilder::build`], so the whole chain can be written
/// without intermediate `?`.
///
/// # Examples
///
/// ```rust
/// use svip::backend::MemoryBackend;
/// use svip::Svip;
///
/// let backend: MemoryBackend<u32, Vec<String>> = MemoryBackend::new(vec![]);
/// let result = Svip::builder(backend)
///     .add_migration(1, 2, |state| Ok(state))
///     .add_migration(1, 2, |state| Ok(state))
///     .build();
/// assert!(result.is_err());
/// ```
pub struct SvipBuilder<V: Version, B: AppStateBackend<V>> {
    error: Option<SvipError>,
    backend: B,
    registry: MigrationRegistry<V, B::State>,
    config: SvipConfig<V>,
}

impl<V: Version, B: AppStateBackend<V>> SvipBuilder<V, B> {
    pub fn new(backend: B) -> Self {
        SvipBuilder {
            error: None,
            backend,
            registry: MigrationRegistry::new(),
            config: SvipConfig::new(),
        }
    }

    /// Registers a prepared step, e.g. one carrying a name.
    pub fn add_step(mut self, step: SvipResult<MigrationStep<V, B::State>>) -> Self {
        if self.error.is_none() {
            if let Err(e) = step.and_then(|step| self.registry.add(step)) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Registers a step from `source` to `target` running `transform`.
    pub fn add_migration<F>(mut self, source: V, target: V, transform: F) -> Self
    where
        F: Fn(B::State) -> SvipResult<B::State> + Send + Sync + 'static,
    {
        if self.error.is_none() {
            if let Err(e) = self.registry.add_migration(source, target, transform) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Registers an upgrade `lower -> upper` and its downgrade `upper -> lower`.
    pub fn add_reversible<U, D>(mut self, lower: V, upper: V, up: U, down: D) -> Self
    where
        U: Fn(B::State) -> SvipResult<B::State> + Send + Sync + 'static,
        D: Fn(B::State) -> SvipResult<B::State> + Send + Sync + 'static,
    {
        if self.error.is_none() {
            if let Err(e) = self.registry.add_reversible(lower, upper, up, down) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Declares an edge that must never run, typically a lossy downgrade.
    pub fn add_irreversible(mut self, source: V, target: V) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.registry.add_irreversible(source, target) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Version assumed while the backend holds no version marker.
    pub fn initial_version(mut self, version: V) -> Self {
        self.config.set_initial_version(version);
        self
    }

    /// Reporter receiving progress of verbose migrations.
    pub fn reporter<R: ProgressReporter<V> + 'static>(mut self, reporter: R) -> Self {
        self.config.set_reporter(Arc::new(reporter));
        self
    }

    /// Returns the orchestrator, or the first error captured while building.
    pub fn build(self) -> SvipResult<Svip<V, B>> {
        if let Some(error) = self.error {
            return Err(error);
        }
        log::debug!(
            "Built migration orchestrator with {} step(s) over versions {:?}",
            self.registry.len(),
            self.registry.versions()
        );
        Ok(Svip::new(self.backend, self.registry, self.config))
    }
}
