//! The application state backend contract.
//!
//! Every storage engine SVIP migrates is reached through an [`AppStateBackend`]:
//! it hands out the state handle steps operate on, owns the persisted version
//! marker and captures and restores backups. [`MemoryBackend`] is the in-process
//! implementation shipped with this crate.

mod backup;
mod memory;

pub use backup::*;
pub use memory::*;

use crate::common::short_type_name;
use crate::errors::{ErrorKind, SvipError, SvipResult};
use crate::migration::MigrationInfo;
use crate::version::Version;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Diagnostic summary of a backend, attribute name to rendered value.
pub type BackendInfo = BTreeMap<String, String>;

/// Declared configuration attributes of a backend.
///
/// Implemented by hand or with `#[derive(BackendAttributes)]` from `svip_derive`.
/// The default renders nothing.
pub trait BackendAttributes {
    fn attributes(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Capability set a storage backend provides to the migration engine.
///
/// # Contract
///
/// - `backup(None)` must succeed whenever `supports_backup()` is `true`, migration
///   or not.
/// - `restore` rolls back the version marker together with the data. A missing or
///   corrupt artifact is reported as [`crate::errors::ErrorKind::RestoreFailed`].
/// - `set_version` is part of a step's success: the engine calls it right after
///   each step and treats its failure as the step's failure.
/// - `current_version` returns `None` for a store that was never migrated.
/// - A backend reporting `supports_transaction()` hands out transactions covering
///   the data and the version marker. The engine runs a whole plan inside one and
///   rolls it back on failure before falling back to the backup.
pub trait AppStateBackend<V: Version>: BackendAttributes + Send + Sync {
    /// Handle passed to migration steps.
    type State;

    /// Returns the handle steps operate on.
    fn state(&self) -> SvipResult<Self::State>;

    fn supports_backup(&self) -> bool;

    /// Captures the current state, version marker included.
    fn backup(&self, migration_info: Option<&MigrationInfo<V>>) -> SvipResult<BackupHandle>;

    /// Restores the state captured by `handle`.
    fn restore(&self, handle: &BackupHandle) -> SvipResult<()>;

    fn current_version(&self) -> SvipResult<Option<V>>;

    fn set_version(&self, version: &V) -> SvipResult<()>;

    fn supports_transaction(&self) -> bool {
        false
    }

    /// Opens a transaction every following change, version marker included,
    /// belongs to until it is committed or rolled back.
    fn begin_transaction(&self) -> SvipResult<Box<dyn StateTransaction + '_>> {
        log::error!(
            "Transaction requested on {} which does not support them",
            short_type_name(std::any::type_name::<Self>())
        );
        Err(SvipError::new(
            &format!(
                "Backend {} does not support transactions",
                short_type_name(std::any::type_name::<Self>())
            ),
            ErrorKind::InvalidOperation,
        ))
    }

    /// Diagnostic summary: the backend type followed by its declared attributes.
    fn info(&self) -> BackendInfo {
        let mut info = BackendInfo::new();
        info.insert(
            "backend".to_string(),
            short_type_name(std::any::type_name::<Self>()),
        );
        info.insert("supports_backup".to_string(), self.supports_backup().to_string());
        info.insert(
            "supports_transaction".to_string(),
            self.supports_transaction().to_string(),
        );
        for (name, value) in self.attributes() {
            info.insert(name, value);
        }
        info
    }

    /// Versions the store went through, oldest first.
    fn version_history(&self) -> SvipResult<Vec<VersionRecord<V>>> {
        Ok(Vec::new())
    }

    /// Marks the state as inconsistent after a failure that could not be undone.
    fn register_inconsistency(&self, inconsistency: &Inconsistency) -> SvipResult<()> {
        log::warn!(
            "Backend does not persist inconsistency markers: {}",
            inconsistency.message()
        );
        Ok(())
    }

    fn inconsistency(&self) -> SvipResult<Option<Inconsistency>> {
        Ok(None)
    }

    fn clear_inconsistency(&self) -> SvipResult<()> {
        Ok(())
    }
}

/// An open backend transaction.
///
/// Ended by exactly one of `commit` or `rollback`. Dropping it unfinished leaves
/// the changes in place.
pub trait StateTransaction: Send {
    fn commit(self: Box<Self>) -> SvipResult<()>;

    /// Undoes every change made since the transaction began.
    fn rollback(self: Box<Self>) -> SvipResult<()>;
}

/// A version the store reached, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VersionRecord<V> {
    version: V,
    recorded_at: DateTime<Utc>,
}

impl<V: Version> VersionRecord<V> {
    pub fn new(version: V) -> Self {
        VersionRecord {
            version,
            recorded_at: Utc::now(),
        }
    }

    pub fn version(&self) -> &V {
        &self.version
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

/// Marker left on a store whose state no longer matches its version.
///
/// While present, migrations are refused until an operator clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Inconsistency {
    message: String,
    backup_info: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl Inconsistency {
    pub fn new(message: &str, backup_info: Option<String>) -> Self {
        Inconsistency {
            message: message.to_string(),
            backup_info,
            recorded_at: Utc::now(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Description of the backup taken before the failed migration, if any.
    pub fn backup_info(&self) -> Option<&str> {
        self.backup_info.as_deref()
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}
