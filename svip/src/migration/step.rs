use crate::errors::{ErrorKind, SvipError, SvipResult};
use crate::version::{Direction, Version};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Transformation applied by a step to the backend's state handle.
pub type StepFn<S> = Arc<dyn Fn(S) -> SvipResult<S> + Send + Sync>;

/// A declared transformation of application state from one version to another.
///
/// Steps are immutable once built and cheap to clone. A step built with
/// [`MigrationStep::irreversible`] occupies its edge in the version graph but has
/// no transformation: any plan that needs it is refused with
/// [`ErrorKind::UnsupportedDirection`].
///
/// ```rust
/// use svip::migration::MigrationStep;
///
/// let step: MigrationStep<u32, Vec<String>> = MigrationStep::new(1, 2, |mut state: Vec<String>| {
///     state.push("email".to_string());
///     Ok(state)
/// })
/// .unwrap()
/// .with_name("addField");
///
/// assert_eq!(step.apply(vec![]).unwrap(), vec!["email".to_string()]);
/// ```
pub struct MigrationStep<V: Version, S> {
    source: V,
    target: V,
    name: Option<String>,
    transform: Option<StepFn<S>>,
}

impl<V: Version, S> MigrationStep<V, S> {
    /// Creates a step from `source` to `target`.
    ///
    /// Fails with [`ErrorKind::InvalidStep`] when both versions are equal.
    pub fn new<F>(source: V, target: V, transform: F) -> SvipResult<Self>
    where
        F: Fn(S) -> SvipResult<S> + Send + Sync + 'static,
    {
        Self::validate(&source, &target)?;
        Ok(MigrationStep {
            source,
            target,
            name: None,
            transform: Some(Arc::new(transform)),
        })
    }

    /// Declares an edge that cannot be travelled.
    ///
    /// Typically registered for the downgrade of a step whose data loss cannot be undone.
    pub fn irreversible(source: V, target: V) -> SvipResult<Self> {
        Self::validate(&source, &target)?;
        Ok(MigrationStep {
            source,
            target,
            name: None,
            transform: None,
        })
    }

    fn validate(source: &V, target: &V) -> SvipResult<()> {
        if source == target {
            log::error!("Migration step source and target are both {}", source);
            return Err(SvipError::new(
                &format!(
                    "Invalid migration step: source and target version are both {}",
                    source
                ),
                ErrorKind::InvalidStep,
            ));
        }
        Ok(())
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn source(&self) -> &V {
        &self.source
    }

    pub fn target(&self) -> &V {
        &self.target
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn direction(&self) -> Direction {
        if self.source < self.target {
            Direction::Upgrade
        } else {
            Direction::Downgrade
        }
    }

    /// `false` for steps declared with [`MigrationStep::irreversible`].
    pub fn is_executable(&self) -> bool {
        self.transform.is_some()
    }

    /// Applies the transformation to `state`.
    ///
    /// Any failure is reported as [`ErrorKind::MigrationFailure`] naming both
    /// versions, with the transformation's own error as cause.
    pub fn apply(&self, state: S) -> SvipResult<S> {
        let transform = self.transform.as_ref().ok_or_else(|| {
            log::error!("Migration step {} cannot be applied", self);
            SvipError::new(
                &format!(
                    "Migration step {} does not support the {} direction",
                    self,
                    self.direction()
                ),
                ErrorKind::UnsupportedDirection,
            )
        })?;

        transform(state).map_err(|cause| {
            log::error!("Migration step {} failed: {}", self, cause);
            SvipError::new_with_cause(
                &format!(
                    "Migration step from version {} to {} failed: {}",
                    self.source, self.target, cause
                ),
                ErrorKind::MigrationFailure,
                cause,
            )
        })
    }
}

impl<V: Version, S> Clone for MigrationStep<V, S> {
    fn clone(&self) -> Self {
        MigrationStep {
            source: self.source.clone(),
            target: self.target.clone(),
            name: self.name.clone(),
            transform: self.transform.clone(),
        }
    }
}

impl<V: Version, S> Display for MigrationStep<V, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} -> {} ({})", self.source, self.target, name),
            None => write!(f, "{} -> {}", self.source, self.target),
        }
    }
}

impl<V: Version, S> Debug for MigrationStep<V, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("name", &self.name)
            .field("executable", &self.is_executable())
            .finish()
    }
}
