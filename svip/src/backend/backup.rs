use crate::migration::MigrationInfo;
use crate::version::Version;
use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reference to a backup artifact captured by a backend.
///
/// The engine never looks inside the artifact: it keeps the handle for the
/// duration of a migration and passes it back to the backend to restore. Where
/// and for how long the artifact lives is up to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BackupHandle {
    id: String,
    created_at: DateTime<Utc>,
    label: Option<String>,
    location: Option<String>,
    from_version: Option<String>,
    to_version: Option<String>,
}

impl BackupHandle {
    /// Creates a handle with a fresh id, timestamped now.
    pub fn new() -> Self {
        BackupHandle {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            label: None,
            location: None,
            from_version: None,
            to_version: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Backend-defined address of the artifact, e.g. a directory.
    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    /// Tags the handle with the migration it precedes.
    pub fn for_migration<V: Version>(mut self, migration_info: Option<&MigrationInfo<V>>) -> Self {
        if let Some(info) = migration_info {
            self.from_version = Some(info.from_version().to_string());
            self.to_version = Some(info.to_version().to_string());
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn from_version(&self) -> Option<&str> {
        self.from_version.as_deref()
    }

    pub fn to_version(&self) -> Option<&str> {
        self.to_version.as_deref()
    }

    /// `true` for backups taken outside any migration.
    pub fn is_standalone(&self) -> bool {
        self.from_version.is_none()
    }

    /// One-line human readable description.
    pub fn info(&self) -> String {
        let mut info = format!("backup {}", self.id);
        if let Some(label) = &self.label {
            info.push_str(&format!(" '{}'", label));
        }
        info.push_str(&format!(" taken at {}", self.created_at.to_rfc3339()));
        if let (Some(from), Some(to)) = (&self.from_version, &self.to_version) {
            info.push_str(&format!(" before migration {} -> {}", from, to));
        }
        if let Some(location) = &self.location {
            info.push_str(&format!(", stored at {}", location));
        }
        info
    }
}

impl Default for BackupHandle {
    fn default() -> Self {
        BackupHandle::new()
    }
}

impl Display for BackupHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.info())
    }
}
