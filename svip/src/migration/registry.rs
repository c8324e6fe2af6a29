use super::plan::{resolve, MigrationPlan};
use super::step::MigrationStep;
use crate::errors::{ErrorKind, SvipError, SvipResult};
use crate::version::{SemanticVersion, Version};
use semver::VersionReq;
use std::collections::BTreeSet;

/// The set of migration steps an application declares.
///
/// The registry only rejects malformed or duplicated edges. Forks and gaps in the
/// version graph are reported when a plan is resolved, since the full set of steps
/// may not be known before then.
pub struct MigrationRegistry<V: Version, S> {
    steps: Vec<MigrationStep<V, S>>,
}

impl<V: Version, S> MigrationRegistry<V, S> {
    pub fn new() -> Self {
        MigrationRegistry { steps: Vec::new() }
    }

    /// Registers a step.
    ///
    /// Fails with [`ErrorKind::ValidationError`] when a step between the same two
    /// versions is already registered.
    pub fn add(&mut self, step: MigrationStep<V, S>) -> SvipResult<()> {
        let duplicate = self
            .steps
            .iter()
            .any(|existing| existing.source() == step.source() && existing.target() == step.target());
        if duplicate {
            log::error!("Migration step {} is already registered", step);
            return Err(SvipError::new(
                &format!(
                    "A migration step from version {} to {} is already registered",
                    step.source(),
                    step.target()
                ),
                ErrorKind::ValidationError,
            ));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Registers a step built from a closure.
    pub fn add_migration<F>(&mut self, source: V, target: V, transform: F) -> SvipResult<()>
    where
        F: Fn(S) -> SvipResult<S> + Send + Sync + 'static,
    {
        self.add(MigrationStep::new(source, target, transform)?)
    }

    /// Registers the pair of opposite steps between `lower` and `upper`.
    pub fn add_reversible<U, D>(&mut self, lower: V, upper: V, up: U, down: D) -> SvipResult<()>
    where
        U: Fn(S) -> SvipResult<S> + Send + Sync + 'static,
        D: Fn(S) -> SvipResult<S> + Send + Sync + 'static,
    {
        if lower >= upper {
            log::error!("Reversible step bounds out of order: {} >= {}", lower, upper);
            return Err(SvipError::new(
                &format!(
                    "Invalid reversible step: lower version {} must be below upper version {}",
                    lower, upper
                ),
                ErrorKind::InvalidStep,
            ));
        }
        let up = MigrationStep::new(lower.clone(), upper.clone(), up)?;
        let down = MigrationStep::new(upper, lower, down)?;
        self.add(up)?;
        self.add(down)
    }

    /// Registers an edge that refuses to run.
    pub fn add_irreversible(&mut self, source: V, target: V) -> SvipResult<()> {
        self.add(MigrationStep::irreversible(source, target)?)
    }

    pub fn steps(&self) -> &[MigrationStep<V, S>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every version mentioned by a registered step.
    pub fn versions(&self) -> BTreeSet<V> {
        self.steps
            .iter()
            .flat_map(|step| [step.source().clone(), step.target().clone()])
            .collect()
    }

    /// The highest version any step leads to.
    pub fn latest_version(&self) -> Option<V> {
        self.steps.iter().map(|step| step.target()).max().cloned()
    }

    /// Resolves the plan from `current` to `target`, see [`resolve`].
    pub fn resolve(&self, current: &V, target: &V) -> SvipResult<MigrationPlan<V, S>> {
        resolve(current, target, &self.steps)
    }
}

impl<V: SemanticVersion, S> MigrationRegistry<V, S> {
    /// The highest registered version satisfying `requirement`.
    pub fn latest_match(&self, requirement: &VersionReq) -> Option<V> {
        self.versions()
            .into_iter()
            .rev()
            .find(|version| version.satisfies(requirement))
    }
}

impl<V: Version, S> Default for MigrationRegistry<V, S> {
    fn default() -> Self {
        MigrationRegistry::new()
    }
}

impl<V: Version, S> Clone for MigrationRegistry<V, S> {
    fn clone(&self) -> Self {
        MigrationRegistry {
            steps: self.steps.clone(),
        }
    }
}
