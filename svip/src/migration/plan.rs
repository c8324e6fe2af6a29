use super::step::MigrationStep;
use crate::errors::{ErrorKind, SvipError, SvipResult};
use crate::version::{Direction, Version};
use itertools::Itertools;
use std::fmt::{Debug, Display, Formatter};

/// Ordered sequence of steps leading from one version to another.
///
/// Plans are computed fresh for every migration request and consumed once.
pub struct MigrationPlan<V: Version, S> {
    from: V,
    to: V,
    steps: Vec<MigrationStep<V, S>>,
}

impl<V: Version, S> MigrationPlan<V, S> {
    pub fn from_version(&self) -> &V {
        &self.from
    }

    pub fn to_version(&self) -> &V {
        &self.to
    }

    /// `None` for an empty plan.
    pub fn direction(&self) -> Option<Direction> {
        Direction::between(&self.from, &self.to)
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

    /// Versions visited by the plan, starting version included.
    pub fn versions(&self) -> Vec<V> {
        let mut versions = Vec::with_capacity(self.steps.len() + 1);
        versions.push(self.from.clone());
        versions.extend(self.steps.iter().map(|step| step.target().clone()));
        versions
    }
}

impl<V: Version, S> IntoIterator for MigrationPlan<V, S> {
    type Item = MigrationStep<V, S>;
    type IntoIter = std::vec::IntoIter<MigrationStep<V, S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

impl<V: Version, S> Debug for MigrationPlan<V, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationPlan")
            .field("versions", &self.versions())
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl<V: Version, S> Display for MigrationPlan<V, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.versions().iter().join(" -> "))
    }
}

/// Computes the path of steps from `current` to `target`.
///
/// Versions are nodes and steps are directed edges. Starting at `current`, each hop
/// takes the single step leaving the current node in the direction of travel:
///
/// - `current == target` yields an empty plan.
/// - no step leaving a node, or a step jumping past `target`, fails with
///   [`ErrorKind::UnreachableVersion`] naming the gap;
/// - several steps leaving the same node fail with
///   [`ErrorKind::AmbiguousMigrationPath`];
/// - a step registered as irreversible fails with
///   [`ErrorKind::UnsupportedDirection`].
///
/// Every hop moves strictly toward `target`, so the walk cannot cycle.
pub fn resolve<V: Version, S>(
    current: &V,
    target: &V,
    steps: &[MigrationStep<V, S>],
) -> SvipResult<MigrationPlan<V, S>> {
    let direction = match Direction::between(current, target) {
        Some(direction) => direction,
        None => {
            return Ok(MigrationPlan {
                from: current.clone(),
                to: target.clone(),
                steps: Vec::new(),
            })
        }
    };

    let mut path: Vec<MigrationStep<V, S>> = Vec::new();
    let mut node = current.clone();

    while node != *target {
        let mut candidates: Vec<&MigrationStep<V, S>> = steps
            .iter()
            .filter(|step| *step.source() == node && direction.advances(&node, step.target()))
            .collect();

        match direction {
            Direction::Upgrade => candidates.sort_by(|a, b| a.target().cmp(b.target())),
            Direction::Downgrade => candidates.sort_by(|a, b| b.target().cmp(a.target())),
        }

        let step = match candidates.as_slice() {
            [] => {
                log::error!("No migration step from {} toward {}", node, target);
                return Err(SvipError::new(
                    &format!(
                        "Version {} is unreachable from {}: no {} step from version {}",
                        target, current, direction, node
                    ),
                    ErrorKind::UnreachableVersion,
                ));
            }
            [step] => *step,
            many => {
                log::error!("Ambiguous migration path at version {}", node);
                return Err(SvipError::new(
                    &format!(
                        "Ambiguous migration path: {} {} steps leave version {} ({})",
                        many.len(),
                        direction,
                        node,
                        many.iter().map(|step| step.to_string()).join(", ")
                    ),
                    ErrorKind::AmbiguousMigrationPath,
                ));
            }
        };

        if direction.overshoots(step.target(), target) {
            log::error!("Migration step {} jumps past target {}", step, target);
            return Err(SvipError::new(
                &format!(
                    "Version {} is unreachable from {}: step {} jumps past it",
                    target, current, step
                ),
                ErrorKind::UnreachableVersion,
            ));
        }

        if !step.is_executable() {
            log::error!("Migration step {} is irreversible", step);
            return Err(SvipError::new(
                &format!(
                    "Cannot {} from {} to {}: step {} does not support this direction",
                    direction, current, target, step
                ),
                ErrorKind::UnsupportedDirection,
            ));
        }

        node = step.target().clone();
        path.push(step.clone());
    }

    Ok(MigrationPlan {
        from: current.clone(),
        to: target.clone(),
        steps: path,
    })
}
