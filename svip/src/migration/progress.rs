use crate::errors::{ErrorKind, SvipError, SvipResult};
use crate::version::Version;
use parking_lot::Mutex;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Whether a progress event is emitted before or after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Started,
    Completed,
}

/// Progress of a single step within a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent<V> {
    /// 1-based position of the step in the plan.
    pub step_index: usize,
    pub total_steps: usize,
    pub source_version: V,
    pub target_version: V,
    pub step_name: Option<String>,
    pub status: StepStatus,
}

impl<V: Version> Display for ProgressEvent<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = self
            .step_name
            .as_ref()
            .map(|name| format!(" ({})", name))
            .unwrap_or_default();
        match self.status {
            StepStatus::Started => write!(
                f,
                "[{}/{}] migrating {} -> {}{}",
                self.step_index, self.total_steps, self.source_version, self.target_version, name
            ),
            StepStatus::Completed => write!(
                f,
                "[{}/{}] now at version {}",
                self.step_index, self.total_steps, self.target_version
            ),
        }
    }
}

/// States a single `migrate` call goes through.
///
/// `Idle -> Resolving -> BackingUp? -> Applying(i) -> Committed`, or on a step
/// failure `Applying(i) -> Aborting -> AbortedRolledBack | AbortedRestored |
/// AbortedRestoreFailed | AbortedUnrestored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Idle,
    Resolving,
    BackingUp,
    Applying { step: usize, total: usize },
    Committed,
    Aborting,
    /// The backend transaction was rolled back after a failure.
    AbortedRolledBack,
    /// The backup was restored after a failure.
    AbortedRestored,
    /// The backup could not be restored, the state is marked inconsistent.
    AbortedRestoreFailed,
    /// No backup had been taken, the state is marked inconsistent.
    AbortedUnrestored,
}

impl MigrationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationPhase::Committed
                | MigrationPhase::AbortedRolledBack
                | MigrationPhase::AbortedRestored
                | MigrationPhase::AbortedRestoreFailed
                | MigrationPhase::AbortedUnrestored
        )
    }
}

impl Display for MigrationPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationPhase::Idle => write!(f, "idle"),
            MigrationPhase::Resolving => write!(f, "resolving"),
            MigrationPhase::BackingUp => write!(f, "backing up"),
            MigrationPhase::Applying { step, total } => write!(f, "applying {}/{}", step, total),
            MigrationPhase::Committed => write!(f, "committed"),
            MigrationPhase::Aborting => write!(f, "aborting"),
            MigrationPhase::AbortedRolledBack => write!(f, "aborted, transaction rolled back"),
            MigrationPhase::AbortedRestored => write!(f, "aborted, backup restored"),
            MigrationPhase::AbortedRestoreFailed => write!(f, "aborted, restore failed"),
            MigrationPhase::AbortedUnrestored => write!(f, "aborted, nothing restored"),
        }
    }
}

/// Sink for verbose migration progress.
///
/// Reporters are only called for verbose migrations. Their failures, panics
/// included, are logged and otherwise ignored: reporting never changes the outcome
/// of a migration.
pub trait ProgressReporter<V: Version>: Send + Sync {
    fn on_step(&self, event: &ProgressEvent<V>) -> SvipResult<()>;

    fn on_phase(&self, _phase: &MigrationPhase) -> SvipResult<()> {
        Ok(())
    }
}

impl<V, F> ProgressReporter<V> for F
where
    V: Version,
    F: Fn(&ProgressEvent<V>) + Send + Sync,
{
    fn on_step(&self, event: &ProgressEvent<V>) -> SvipResult<()> {
        self(event);
        Ok(())
    }
}

/// Reports progress through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl<V: Version> ProgressReporter<V> for LogReporter {
    fn on_step(&self, event: &ProgressEvent<V>) -> SvipResult<()> {
        log::info!("{}", event);
        Ok(())
    }

    fn on_phase(&self, phase: &MigrationPhase) -> SvipResult<()> {
        log::debug!("Migration phase: {}", phase);
        Ok(())
    }
}

/// Writes one line per progress event.
pub struct WriterReporter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterReporter<W> {
    pub fn new(writer: W) -> Self {
        WriterReporter {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<V: Version, W: Write + Send> ProgressReporter<V> for WriterReporter<W> {
    fn on_step(&self, event: &ProgressEvent<V>) -> SvipResult<()> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", event)?;
        writer.flush()?;
        Ok(())
    }
}

pub(crate) fn notify_step<V: Version>(reporter: &dyn ProgressReporter<V>, event: &ProgressEvent<V>) {
    guard_reporter(|| reporter.on_step(event));
}

pub(crate) fn notify_phase<V: Version>(reporter: &dyn ProgressReporter<V>, phase: &MigrationPhase) {
    guard_reporter(|| reporter.on_phase(phase));
}

fn guard_reporter<F>(call: F)
where
    F: FnOnce() -> SvipResult<()>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            log::warn!("Progress reporter failed, ignoring: {}", err);
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let err = SvipError::new(&message, ErrorKind::InternalError);
            log::warn!("Progress reporter panicked, ignoring: {}", err);
        }
    }
}
