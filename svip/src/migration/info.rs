use crate::backend::BackupHandle;
use crate::version::{Direction, Version};
use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Describes the migration a backup is taken for.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MigrationInfo<V> {
    from_version: V,
    to_version: V,
    started_at: DateTime<Utc>,
}

impl<V: Version> MigrationInfo<V> {
    /// Creates the info of a migration starting now.
    pub fn new(from_version: V, to_version: V) -> Self {
        MigrationInfo {
            from_version,
            to_version,
            started_at: Utc::now(),
        }
    }

    pub fn from_version(&self) -> &V {
        &self.from_version
    }

    pub fn to_version(&self) -> &V {
        &self.to_version
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn direction(&self) -> Option<Direction> {
        Direction::between(&self.from_version, &self.to_version)
    }
}

impl<V: Version> Display for MigrationInfo<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "migration {} -> {} started at {}",
            self.from_version,
            self.to_version,
            self.started_at.to_rfc3339()
        )
    }
}

/// Summary of a successful migration.
#[derive(Debug, Clone)]
pub struct MigrationResult<V> {
    final_version: V,
    steps_applied: usize,
    backup: Option<BackupHandle>,
}

impl<V: Version> MigrationResult<V> {
    pub(crate) fn new(final_version: V, steps_applied: usize, backup: Option<BackupHandle>) -> Self {
        MigrationResult {
            final_version,
            steps_applied,
            backup,
        }
    }

    pub fn final_version(&self) -> &V {
        &self.final_version
    }

    pub fn steps_applied(&self) -> usize {
        self.steps_applied
    }

    /// Handle of the backup taken before the migration, if any.
    pub fn backup(&self) -> Option<&BackupHandle> {
        self.backup.as_ref()
    }
}

/// Options of a single migration request.
///
/// Programmatic migrations are quiet and take a backup by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrateOptions {
    verbose: bool,
    save_backup: bool,
}

impl MigrateOptions {
    pub fn new() -> Self {
        MigrateOptions {
            verbose: false,
            save_backup: true,
        }
    }

    /// Emits progress events while the migration runs.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Takes a backup before the first step. Opting out means a failed step
    /// cannot be undone.
    pub fn save_backup(mut self, save_backup: bool) -> Self {
        self.save_backup = save_backup;
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn saves_backup(&self) -> bool {
        self.save_backup
    }
}

impl Default for MigrateOptions {
    fn default() -> Self {
        MigrateOptions::new()
    }
}
