use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Outcome of the restore attempt that follows a failed migration.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RestoreOutcome {
    /// The backup taken before the migration was restored.
    Restored,
    /// No backup had been taken, nothing was restored.
    NoBackup,
    /// The backend transaction the migration ran in was rolled back.
    RolledBack,
}

/// Error kinds for SVIP operations
///
/// Resolution errors (`UnreachableVersion`, `AmbiguousMigrationPath`,
/// `UnsupportedDirection`) and pre-flight errors (`BackupUnavailable`,
/// `InconsistentState`, `MigrationInProgress`) are raised before any mutation of the
/// application state. `MigrationFailure` describes a single failed step,
/// `MigrationAborted` wraps it once the restore attempt is over and `RestoreFailed`
/// means the state is no longer known to match its version.
///
/// # Examples
///
/// ```rust
/// use svip::errors::{ErrorKind, SvipError, SvipResult};
///
/// fn example() -> SvipResult<()> {
///     Err(SvipError::new("no step from 3 toward 5", ErrorKind::UnreachableVersion))
/// }
/// assert_eq!(example().unwrap_err().kind(), &ErrorKind::UnreachableVersion);
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Resolution errors
    /// No chain of steps leads from the current version to the target
    UnreachableVersion,
    /// More than one step leaves a version in the direction of travel
    AmbiguousMigrationPath,
    /// A step on the path refuses to run in the requested direction
    UnsupportedDirection,
    /// A step declaration is malformed
    InvalidStep,

    // Backup errors
    /// A backup was requested but the backend cannot take one
    BackupUnavailable,
    /// The backend failed while capturing a backup
    BackupFailed,

    // Migration errors
    /// A single step failed while being applied
    MigrationFailure,
    /// A migration stopped after a step failure, with the restore outcome
    MigrationAborted(RestoreOutcome),
    /// Restoring the backup after a failure did not complete
    RestoreFailed,
    /// The backend could not open the transaction a migration runs in
    TransactionFailed,
    /// Another migration is running on the same orchestrator
    MigrationInProgress,

    // Guard errors
    /// The application state is marked inconsistent by an earlier failure
    InconsistentState,
    /// The current version does not satisfy the requested range or requirement
    IncompatibleVersion,
    /// No registered version satisfies a requirement
    VersionNotFound,

    // Generic errors
    /// The operation is not valid in the current context
    InvalidOperation,
    /// Invalid input value
    ValidationError,
    /// Error reported by a backend
    BackendError,
    /// Generic IO error
    IOError,
    /// Error encoding or decoding persisted data
    EncodingError,
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::UnreachableVersion => write!(f, "Unreachable version"),
            ErrorKind::AmbiguousMigrationPath => write!(f, "Ambiguous migration path"),
            ErrorKind::UnsupportedDirection => write!(f, "Unsupported direction"),
            ErrorKind::InvalidStep => write!(f, "Invalid step"),
            ErrorKind::BackupUnavailable => write!(f, "Backup unavailable"),
            ErrorKind::BackupFailed => write!(f, "Backup failed"),
            ErrorKind::MigrationFailure => write!(f, "Migration failure"),
            ErrorKind::MigrationAborted(RestoreOutcome::Restored) => {
                write!(f, "Migration aborted (backup restored)")
            }
            ErrorKind::MigrationAborted(RestoreOutcome::NoBackup) => {
                write!(f, "Migration aborted (no backup)")
            }
            ErrorKind::MigrationAborted(RestoreOutcome::RolledBack) => {
                write!(f, "Migration aborted (transaction rolled back)")
            }
            ErrorKind::RestoreFailed => write!(f, "Restore failed"),
            ErrorKind::TransactionFailed => write!(f, "Transaction failed"),
            ErrorKind::MigrationInProgress => write!(f, "Migration in progress"),
            ErrorKind::InconsistentState => write!(f, "Inconsistent state"),
            ErrorKind::IncompatibleVersion => write!(f, "Incompatible version"),
            ErrorKind::VersionNotFound => write!(f, "Version not found"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::ValidationError => write!(f, "Validation error"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom SVIP error type.
///
/// `SvipError` carries a message, an [`ErrorKind`] and an optional cause, so that
/// an aborted migration still exposes the step failure that triggered it.
///
/// # Examples
///
/// ```rust
/// use svip::errors::{ErrorKind, RestoreOutcome, SvipError};
///
/// let failure = SvipError::new("step 2 -> 3 failed", ErrorKind::MigrationFailure);
/// let err = SvipError::new_with_cause(
///     "migration aborted",
///     ErrorKind::MigrationAborted(RestoreOutcome::Restored),
///     failure,
/// );
/// assert!(err.restore_ok());
/// assert_eq!(err.cause().unwrap().kind(), &ErrorKind::MigrationFailure);
/// ```
#[derive(Clone)]
pub struct SvipError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<SvipError>>,
    backtrace: Atomic<Backtrace>,
}

impl SvipError {
    /// Creates a new `SvipError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        SvipError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `SvipError` with a cause error.
    ///
    /// This creates an error chain where the cause error is preserved for debugging.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: SvipError) -> Self {
        SvipError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&SvipError> {
        self.cause.as_deref()
    }

    /// The innermost error of the chain.
    pub fn root_cause(&self) -> &SvipError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }

    /// `true` when this error reports a migration that was aborted and whose
    /// state is back at the version it started from, through a restored backup
    /// or a rolled back transaction.
    pub fn restore_ok(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::MigrationAborted(RestoreOutcome::Restored)
                | ErrorKind::MigrationAborted(RestoreOutcome::RolledBack)
        )
    }

    /// Renders the error and all its causes, one per line.
    pub fn chain(&self) -> String {
        let mut rendered = format!("{}: {}", self.error_kind, self.message);
        let mut current = self.cause();
        while let Some(cause) = current {
            rendered.push_str(&format!("\nCaused by: {}: {}", cause.error_kind, cause.message));
            current = cause.cause();
        }
        rendered
    }
}

impl Display for SvipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for SvipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for SvipError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for SVIP operations.
pub type SvipResult<T> = Result<T, SvipError>;

impl From<std::io::Error> for SvipError {
    fn from(err: std::io::Error) -> Self {
        SvipError::new(&format!("IO error: {}", err), ErrorKind::IOError)
    }
}

impl From<std::fmt::Error> for SvipError {
    fn from(err: std::fmt::Error) -> Self {
        SvipError::new(&format!("Formatting error: {}", err), ErrorKind::InternalError)
    }
}

impl From<anyhow::Error> for SvipError {
    fn from(err: anyhow::Error) -> Self {
        SvipError::new(&format!("{:#}", err), ErrorKind::InternalError)
    }
}

impl From<String> for SvipError {
    fn from(msg: String) -> Self {
        SvipError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for SvipError {
    fn from(msg: &str) -> Self {
        SvipError::new(msg, ErrorKind::InternalError)
    }
}
