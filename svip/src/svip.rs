use crate::backend::{AppStateBackend, BackendInfo, BackupHandle, Inconsistency, StateTransaction, VersionRecord};
use crate::common::short_type_name;
use crate::errors::{ErrorKind, RestoreOutcome, SvipError, SvipResult};
use crate::migration::{
    notify_phase, notify_step, MigrateOptions, MigrationInfo, MigrationPhase, MigrationPlan,
    MigrationRegistry, MigrationResult, MigrationStep, ProgressEvent, ProgressReporter, StepStatus,
};
use crate::svip_builder::SvipBuilder;
use crate::svip_config::SvipConfig;
use crate::version::{SemanticVersion, Version};
use parking_lot::{Mutex, RwLock};
use semver::VersionReq;
use std::fmt::{Debug, Formatter};
use std::ops::RangeBounds;
use std::sync::Arc;

/// The migration orchestrator.
///
/// `Svip` binds a set of registered migration steps to one [`AppStateBackend`]
/// and drives the backup, apply and restore-on-failure protocol against it. It
/// keeps no version of its own: every operation re-reads the version marker from
/// the backend, so an instance can be dropped and recreated at any point, and a
/// migration interrupted by a crash resumes from the last version the backend
/// persisted.
///
/// Clones share the same backend and the same migration lock.
///
/// # Examples
///
/// ```rust
/// use svip::backend::{AppStateBackend, MemoryBackend};
/// use svip::errors::{SvipError, ErrorKind};
/// use svip::migration::MigrateOptions;
/// use svip::Svip;
///
/// let backend: MemoryBackend<u32, Vec<String>> = MemoryBackend::new(vec![]);
/// backend.set_version(&1).unwrap();
///
/// let svip = Svip::builder(backend.clone())
///     .add_migration(1, 2, |state| {
///         state.write().push("email".to_string());
///         Ok(state)
///     })
///     .add_migration(2, 3, |_| Err(SvipError::new("column exists", ErrorKind::BackendError)))
///     .build()
///     .unwrap();
///
/// let err = svip.migrate(&3, MigrateOptions::default()).unwrap_err();
/// assert!(err.restore_ok());
/// assert_eq!(svip.current_version().unwrap(), 1);
/// assert!(backend.data().read().is_empty());
/// ```
pub struct Svip<V: Version, B: AppStateBackend<V>> {
    inner: Arc<SvipInner<V, B>>,
}

impl<V: Version, B: AppStateBackend<V>> Svip<V, B> {
    /// Starts building an orchestrator bound to `backend`.
    pub fn builder(backend: B) -> SvipBuilder<V, B> {
        SvipBuilder::new(backend)
    }

    pub(crate) fn new(backend: B, registry: MigrationRegistry<V, B::State>, config: SvipConfig<V>) -> Self {
        Svip {
            inner: Arc::new(SvipInner {
                backend,
                registry,
                config,
                migration_lock: Mutex::new(()),
                phase: RwLock::new(MigrationPhase::Idle),
            }),
        }
    }

    /// Migrates the bound store to `target`.
    ///
    /// Verbose progress goes to the configured reporter.
    ///
    /// # Errors
    ///
    /// - Resolution errors ([`ErrorKind::UnreachableVersion`],
    ///   [`ErrorKind::AmbiguousMigrationPath`], [`ErrorKind::UnsupportedDirection`])
    ///   and [`ErrorKind::BackupUnavailable`] / [`ErrorKind::BackupFailed`] are
    ///   returned before anything is mutated.
    /// - [`ErrorKind::TransactionFailed`] when the backend supports transactions
    ///   but could not open one.
    /// - A failing step yields [`ErrorKind::MigrationAborted`] caused by the
    ///   [`ErrorKind::MigrationFailure`], or [`ErrorKind::RestoreFailed`] when the
    ///   backup could not be restored. On transactional backends the transaction
    ///   is rolled back first and the backup only restored if that fails.
    /// - [`ErrorKind::MigrationInProgress`] and [`ErrorKind::InconsistentState`]
    ///   refuse to start.
    pub fn migrate(&self, target: &V, options: MigrateOptions) -> SvipResult<MigrationResult<V>> {
        let reporter = self.inner.config.reporter();
        self.migrate_with(target, options, reporter.as_ref())
    }

    /// Same as [`Svip::migrate`] with an explicit progress reporter.
    pub fn migrate_with(
        &self,
        target: &V,
        options: MigrateOptions,
        reporter: &dyn ProgressReporter<V>,
    ) -> SvipResult<MigrationResult<V>> {
        let _guard = self.inner.migration_lock.try_lock().ok_or_else(|| {
            log::error!("Migration to version {} refused, another one is running", target);
            SvipError::new(
                "A migration is already running against this store",
                ErrorKind::MigrationInProgress,
            )
        })?;

        MigrationRun {
            inner: &self.inner,
            options,
            reporter,
        }
        .execute(target)
    }

    /// Takes a backup outside of any migration.
    ///
    /// `save_as` labels the returned handle.
    pub fn backup(&self, save_as: Option<&str>) -> SvipResult<BackupHandle> {
        let handle = self.inner.capture(None)?;
        let handle = match save_as {
            Some(label) => handle.with_label(label),
            None => handle,
        };
        log::info!("Created {}", handle.info());
        Ok(handle)
    }

    /// Version the store is at, the configured initial version if it was never
    /// migrated.
    pub fn current_version(&self) -> SvipResult<V> {
        self.inner.current_version()
    }

    /// Highest version any registered step leads to.
    pub fn latest_version(&self) -> Option<V> {
        self.inner.registry.latest_version()
    }

    /// Resolves the plan from the current version to `target` without running it.
    pub fn plan(&self, target: &V) -> SvipResult<MigrationPlan<V, B::State>> {
        let current = self.inner.current_version()?;
        self.inner.registry.resolve(&current, target)
    }

    /// Resolves the plan between two versions, defaulting to the current and the
    /// latest version.
    pub fn steps(&self, current: Option<V>, target: Option<V>) -> SvipResult<MigrationPlan<V, B::State>> {
        let current = match current {
            Some(version) => version,
            None => self.inner.current_version()?,
        };
        let target = target
            .or_else(|| self.latest_version())
            .unwrap_or_else(|| current.clone());
        self.inner.registry.resolve(&current, &target)
    }

    /// Verifies the store can be used by code supporting the versions in `supported`.
    ///
    /// Returns the current version.
    pub fn check<R: RangeBounds<V>>(&self, supported: R) -> SvipResult<V> {
        let current = self.checkable_version()?;
        if !supported.contains(&current) {
            log::error!("Store version {} is outside the supported range", current);
            return Err(SvipError::new(
                &format!("Store is at version {} which is not supported by this application", current),
                ErrorKind::IncompatibleVersion,
            ));
        }
        Ok(current)
    }

    /// Current version once no migration runs and no inconsistency is recorded.
    fn checkable_version(&self) -> SvipResult<V> {
        if self.inner.migration_lock.is_locked() {
            log::error!("Version check refused, a migration is running");
            return Err(SvipError::new(
                "A migration is running against this store",
                ErrorKind::MigrationInProgress,
            ));
        }
        self.inner.ensure_consistent()?;
        self.inner.current_version()
    }

    /// Backend diagnostics together with the current and latest versions.
    pub fn info(&self) -> SvipResult<BackendInfo> {
        let mut info = self.inner.backend.info();
        info.insert("current_version".to_string(), self.inner.current_version()?.to_string());
        if let Some(latest) = self.latest_version() {
            info.insert("latest_version".to_string(), latest.to_string());
        }
        info.insert("registered_steps".to_string(), self.inner.registry.len().to_string());
        if let Some(inconsistency) = self.inner.backend.inconsistency()? {
            info.insert("inconsistency".to_string(), inconsistency.message().to_string());
        }
        Ok(info)
    }

    pub fn version_history(&self) -> SvipResult<Vec<VersionRecord<V>>> {
        self.inner.backend.version_history()
    }

    pub fn inconsistency(&self) -> SvipResult<Option<Inconsistency>> {
        self.inner.backend.inconsistency()
    }

    /// Lifts the inconsistency marker once the state was repaired by hand.
    pub fn clear_inconsistency(&self) -> SvipResult<()> {
        if let Some(inconsistency) = self.inner.backend.inconsistency()? {
            log::info!("Clearing inconsistency marker: {}", inconsistency.message());
        }
        self.inner.backend.clear_inconsistency()
    }

    /// Phase the last migration reached.
    pub fn phase(&self) -> MigrationPhase {
        *self.inner.phase.read()
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn registry(&self) -> &MigrationRegistry<V, B::State> {
        &self.inner.registry
    }

    pub fn config(&self) -> &SvipConfig<V> {
        &self.inner.config
    }
}

impl<V: SemanticVersion, B: AppStateBackend<V>> Svip<V, B> {
    /// Highest registered version satisfying `requirement`.
    pub fn latest_match(&self, requirement: &VersionReq) -> SvipResult<V> {
        self.inner.registry.latest_match(requirement).ok_or_else(|| {
            log::error!("No registered version satisfies {}", requirement);
            SvipError::new(
                &format!("No migration step leads to a version matching {}", requirement),
                ErrorKind::VersionNotFound,
            )
        })
    }

    /// Verifies the current version satisfies `requirement`, the way
    /// [`Svip::check`] verifies a range.
    ///
    /// Returns the current version.
    pub fn check_requirement(&self, requirement: &VersionReq) -> SvipResult<V> {
        let current = self.checkable_version()?;
        if !current.satisfies(requirement) {
            log::error!("Store version {} does not satisfy {}", current, requirement);
            return Err(SvipError::new(
                &format!(
                    "Version requirement {} is incompatible with current version {}",
                    requirement, current
                ),
                ErrorKind::IncompatibleVersion,
            ));
        }
        Ok(current)
    }
}

impl<V: Version, B: AppStateBackend<V>> Debug for Svip<V, B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Svip")
            .field("backend", &self.inner.backend_name())
            .field("registered_steps", &self.inner.registry.len())
            .field("latest_version", &self.latest_version())
            .field("phase", &self.phase())
            .finish()
    }
}

impl<V: Version, B: AppStateBackend<V>> Clone for Svip<V, B> {
    fn clone(&self) -> Self {
        Svip {
            inner: self.inner.clone(),
        }
    }
}

struct SvipInner<V: Version, B: AppStateBackend<V>> {
    backend: B,
    registry: MigrationRegistry<V, B::State>,
    config: SvipConfig<V>,
    migration_lock: Mutex<()>,
    phase: RwLock<MigrationPhase>,
}

impl<V: Version, B: AppStateBackend<V>> SvipInner<V, B> {
    fn backend_name(&self) -> String {
        short_type_name(std::any::type_name::<B>())
    }

    fn current_version(&self) -> SvipResult<V> {
        Ok(self
            .backend
            .current_version()?
            .unwrap_or_else(|| self.config.initial_version().clone()))
    }

    fn ensure_consistent(&self) -> SvipResult<()> {
        if let Some(inconsistency) = self.backend.inconsistency()? {
            log::error!("Store is marked inconsistent: {}", inconsistency.message());
            return Err(SvipError::new(
                &format!(
                    "State is marked inconsistent since {}: {}. Repair it and clear the marker first",
                    inconsistency.recorded_at().to_rfc3339(),
                    inconsistency.message()
                ),
                ErrorKind::InconsistentState,
            ));
        }
        Ok(())
    }

    fn capture(&self, migration_info: Option<&MigrationInfo<V>>) -> SvipResult<BackupHandle> {
        if !self.backend.supports_backup() {
            log::error!("Backend {} does not support backups", self.backend_name());
            return Err(SvipError::new(
                &format!(
                    "Backend {} does not support backups, migrate without saving a backup to accept the risk",
                    self.backend_name()
                ),
                ErrorKind::BackupUnavailable,
            ));
        }

        self.backend.backup(migration_info).map_err(|e| {
            if *e.kind() == ErrorKind::BackupUnavailable {
                return e;
            }
            log::error!("Backup through {} failed: {}", self.backend_name(), e);
            SvipError::new_with_cause(
                &format!("Failed to back up the state through {}", self.backend_name()),
                ErrorKind::BackupFailed,
                e,
            )
        })
    }

    fn begin_transaction(&self) -> SvipResult<Box<dyn StateTransaction + '_>> {
        self.backend.begin_transaction().map_err(|e| {
            log::error!("Failed to open a transaction on {}: {}", self.backend_name(), e);
            SvipError::new_with_cause(
                &format!("Failed to open a transaction on {}", self.backend_name()),
                ErrorKind::TransactionFailed,
                e,
            )
        })
    }

    fn mark_inconsistent(&self, message: &str, backup_info: Option<String>) {
        if let Err(e) = self
            .backend
            .register_inconsistency(&Inconsistency::new(message, backup_info))
        {
            log::error!("Failed to record the inconsistency marker: {}", e);
        }
    }
}

/// One `migrate` call.
struct MigrationRun<'a, V: Version, B: AppStateBackend<V>> {
    inner: &'a SvipInner<V, B>,
    options: MigrateOptions,
    reporter: &'a dyn ProgressReporter<V>,
}

impl<V: Version, B: AppStateBackend<V>> MigrationRun<'_, V, B> {
    fn execute(&self, target: &V) -> SvipResult<MigrationResult<V>> {
        let (current, plan) = match self.resolve(target) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.transition(MigrationPhase::Idle);
                return Err(e);
            }
        };

        if plan.is_empty() {
            log::info!("Store already at version {}, nothing to migrate", current);
            self.transition(MigrationPhase::Committed);
            return Ok(MigrationResult::new(current, 0, None));
        }

        let backup = if self.options.saves_backup() {
            self.transition(MigrationPhase::BackingUp);
            let info = MigrationInfo::new(current.clone(), target.clone());
            match self.inner.capture(Some(&info)) {
                Ok(handle) => {
                    log::info!("Created {}", handle.info());
                    Some(handle)
                }
                Err(e) => {
                    self.transition(MigrationPhase::Idle);
                    return Err(e);
                }
            }
        } else {
            log::warn!("Migrating {} -> {} without a backup", current, target);
            None
        };

        let transaction = if self.inner.backend.supports_transaction() {
            match self.inner.begin_transaction() {
                Ok(transaction) => Some(transaction),
                Err(e) => {
                    self.transition(MigrationPhase::Idle);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let applied = self.apply(&plan);
        let (applied, transaction) = match (applied, transaction) {
            (Ok(()), Some(transaction)) => (self.commit(transaction), None),
            other => other,
        };
        if let Err(failure) = applied {
            return Err(self.abort(failure, transaction, backup, &current, target));
        }

        self.transition(MigrationPhase::Committed);
        log::info!(
            "Migrated from version {} to {} in {} step(s)",
            current,
            target,
            plan.len()
        );
        Ok(MigrationResult::new(target.clone(), plan.len(), backup))
    }

    fn resolve(&self, target: &V) -> SvipResult<(V, MigrationPlan<V, B::State>)> {
        self.inner.ensure_consistent()?;
        self.transition(MigrationPhase::Resolving);
        let current = self.inner.current_version()?;
        let plan = self.inner.registry.resolve(&current, target)?;
        log::debug!("Resolved migration plan {}", plan);
        Ok((current, plan))
    }

    fn apply(&self, plan: &MigrationPlan<V, B::State>) -> SvipResult<()> {
        let total = plan.len();
        let mut state = self.inner.backend.state().map_err(|e| {
            log::error!("Failed to open the application state: {}", e);
            SvipError::new_with_cause("Failed to open the application state", ErrorKind::MigrationFailure, e)
        })?;

        for (index, step) in plan.steps().iter().enumerate() {
            let step_index = index + 1;
            self.transition(MigrationPhase::Applying {
                step: step_index,
                total,
            });
            self.report(step, step_index, total, StepStatus::Started);

            state = step.apply(state)?;
            self.inner.backend.set_version(step.target()).map_err(|e| {
                log::error!("Failed to persist version {}: {}", step.target(), e);
                SvipError::new_with_cause(
                    &format!("Failed to persist version {} after step {}", step.target(), step),
                    ErrorKind::MigrationFailure,
                    e,
                )
            })?;

            self.report(step, step_index, total, StepStatus::Completed);
        }
        Ok(())
    }

    fn commit(&self, transaction: Box<dyn StateTransaction + '_>) -> SvipResult<()> {
        transaction.commit().map_err(|e| {
            log::error!("Failed to commit the migration transaction: {}", e);
            SvipError::new_with_cause("Failed to commit the migration transaction", ErrorKind::MigrationFailure, e)
        })
    }

    fn abort(
        &self,
        failure: SvipError,
        transaction: Option<Box<dyn StateTransaction + '_>>,
        backup: Option<BackupHandle>,
        current: &V,
        target: &V,
    ) -> SvipError {
        self.transition(MigrationPhase::Aborting);
        log::error!("Migration {} -> {} failed: {}", current, target, failure);

        if let Some(transaction) = transaction {
            match transaction.rollback() {
                Ok(()) => {
                    self.transition(MigrationPhase::AbortedRolledBack);
                    log::warn!("Rolled back the migration transaction");
                    return SvipError::new_with_cause(
                        &format!(
                            "Migration from version {} to {} aborted, transaction rolled back to version {}",
                            current, target, current
                        ),
                        ErrorKind::MigrationAborted(RestoreOutcome::RolledBack),
                        failure,
                    );
                }
                Err(rollback_error) => {
                    log::error!("Failed to roll back the migration transaction: {}", rollback_error);
                }
            }
        }

        match backup {
            Some(handle) => match self.inner.backend.restore(&handle) {
                Ok(()) => {
                    self.transition(MigrationPhase::AbortedRestored);
                    log::warn!("Restored {}", handle.info());
                    SvipError::new_with_cause(
                        &format!(
                            "Migration from version {} to {} aborted, state restored to version {}",
                            current, target, current
                        ),
                        ErrorKind::MigrationAborted(RestoreOutcome::Restored),
                        failure,
                    )
                }
                Err(restore_error) => {
                    log::error!("Failed to restore {}: {}", handle.info(), restore_error);
                    let message = format!(
                        "Migration from version {} to {} failed and {} could not be restored: {}",
                        current,
                        target,
                        handle.info(),
                        restore_error
                    );
                    self.inner.mark_inconsistent(&message, Some(handle.info()));
                    self.transition(MigrationPhase::AbortedRestoreFailed);
                    SvipError::new_with_cause(&message, ErrorKind::RestoreFailed, failure)
                }
            },
            None => {
                let message = format!(
                    "Migration from version {} to {} aborted without a backup, state may be partially migrated",
                    current, target
                );
                self.inner.mark_inconsistent(&message, None);
                self.transition(MigrationPhase::AbortedUnrestored);
                SvipError::new_with_cause(
                    &message,
                    ErrorKind::MigrationAborted(RestoreOutcome::NoBackup),
                    failure,
                )
            }
        }
    }

    fn transition(&self, phase: MigrationPhase) {
        *self.inner.phase.write() = phase;
        log::debug!("Migration phase: {}", phase);
        if self.options.is_verbose() {
            notify_phase(self.reporter, &phase);
        }
    }

    fn report(&self, step: &MigrationStep<V, B::State>, step_index: usize, total_steps: usize, status: StepStatus) {
        if !self.options.is_verbose() {
            return;
        }
        let event = ProgressEvent {
            step_index,
            total_steps,
            source_version: step.source().clone(),
            target_version: step.target().clone(),
            step_name: step.name().map(str::to_string),
            status,
        };
        notify_step(self.reporter, &event);
    }
}
