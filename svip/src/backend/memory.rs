use super::{AppStateBackend, BackendAttributes, BackupHandle, Inconsistency, StateTransaction, VersionRecord};
use crate::common::{atomic, Atomic};
use crate::errors::{ErrorKind, SvipError, SvipResult};
use crate::migration::MigrationInfo;
use crate::version::Version;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State handle of a [`MemoryBackend`].
///
/// Clones share the same data.
pub struct MemoryState<T> {
    data: Atomic<T>,
}

impl<T> MemoryState<T> {
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.data.write()
    }
}

impl<T: Clone> MemoryState<T> {
    /// Copy of the current data.
    pub fn snapshot(&self) -> T {
        self.data.read().clone()
    }
}

impl<T> Clone for MemoryState<T> {
    fn clone(&self) -> Self {
        MemoryState {
            data: self.data.clone(),
        }
    }
}

/// Configuration of a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    name: String,
    supports_backup: bool,
    transactional: bool,
    max_backups: usize,
}

impl MemoryConfig {
    pub fn new() -> Self {
        MemoryConfig {
            name: "memory".to_string(),
            supports_backup: true,
            transactional: false,
            max_backups: 8,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Lets the backend opt out of backups altogether.
    pub fn supports_backup(mut self, supports_backup: bool) -> Self {
        self.supports_backup = supports_backup;
        self
    }

    /// Lets migrations run in a transaction that is rolled back on failure.
    pub fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    /// Number of backups kept, oldest dropped first. `0` keeps all of them.
    pub fn max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig::new()
    }
}

impl BackendAttributes for MemoryConfig {
    fn attributes(&self) -> Vec<(String, String)> {
        vec![
            ("name".to_string(), self.name.clone()),
            ("max_backups".to_string(), self.max_backups.to_string()),
        ]
    }
}

#[derive(Clone)]
struct VersionMarker<V> {
    current: Option<V>,
    history: Vec<VersionRecord<V>>,
}

struct MemorySnapshot<V, T> {
    handle: BackupHandle,
    data: T,
    marker: VersionMarker<V>,
}

/// In-process backend keeping the application data behind a lock.
///
/// Backups are full copies of the data taken together with the version marker and
/// history, so restoring one rolls back both.
///
/// ```rust
/// use svip::backend::{AppStateBackend, MemoryBackend};
///
/// let backend: MemoryBackend<u32, Vec<String>> = MemoryBackend::new(vec![]);
/// backend.set_version(&1).unwrap();
/// let handle = backend.backup(None).unwrap();
///
/// backend.state().unwrap().write().push("row".to_string());
/// backend.set_version(&2).unwrap();
///
/// backend.restore(&handle).unwrap();
/// assert!(backend.data().read().is_empty());
/// assert_eq!(backend.current_version().unwrap(), Some(1));
/// ```
pub struct MemoryBackend<V: Version, T> {
    inner: Arc<MemoryBackendInner<V, T>>,
}

impl<V, T> MemoryBackend<V, T>
where
    V: Version,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(data: T) -> Self {
        MemoryBackend::with_config(data, MemoryConfig::new())
    }

    pub fn with_config(data: T, config: MemoryConfig) -> Self {
        MemoryBackend {
            inner: Arc::new(MemoryBackendInner {
                config,
                data: atomic(data),
                marker: RwLock::new(VersionMarker {
                    current: None,
                    history: Vec::new(),
                }),
                inconsistency: RwLock::new(None),
                backups: DashMap::new(),
                in_transaction: AtomicBool::new(false),
            }),
        }
    }

    /// Shared handle to the live data.
    pub fn data(&self) -> MemoryState<T> {
        MemoryState {
            data: self.inner.data.clone(),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }

    /// Retained backups, oldest first.
    pub fn backups(&self) -> Vec<BackupHandle> {
        let mut handles: Vec<BackupHandle> = self
            .inner
            .backups
            .iter()
            .map(|entry| entry.value().handle.clone())
            .collect();
        handles.sort_by_key(|handle| handle.created_at());
        handles
    }

    /// Drops a retained backup, returns `false` when it was not found.
    pub fn discard_backup(&self, id: &str) -> bool {
        self.inner.backups.remove(id).is_some()
    }
}

impl<V: Version, T> Clone for MemoryBackend<V, T> {
    fn clone(&self) -> Self {
        MemoryBackend {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Version, T> BackendAttributes for MemoryBackend<V, T> {
    fn attributes(&self) -> Vec<(String, String)> {
        let mut attributes = self.inner.config.attributes();
        attributes.push(("retained_backups".to_string(), self.inner.backups.len().to_string()));
        attributes
    }
}

impl<V, T> AppStateBackend<V> for MemoryBackend<V, T>
where
    V: Version,
    T: Clone + Send + Sync + 'static,
{
    type State = MemoryState<T>;

    fn state(&self) -> SvipResult<MemoryState<T>> {
        Ok(self.data())
    }

    fn supports_backup(&self) -> bool {
        self.inner.config.supports_backup
    }

    fn backup(&self, migration_info: Option<&MigrationInfo<V>>) -> SvipResult<BackupHandle> {
        self.inner.backup(migration_info)
    }

    fn restore(&self, handle: &BackupHandle) -> SvipResult<()> {
        self.inner.restore(handle)
    }

    fn supports_transaction(&self) -> bool {
        self.inner.config.transactional
    }

    fn begin_transaction(&self) -> SvipResult<Box<dyn StateTransaction + '_>> {
        let transaction = MemoryBackendInner::begin_transaction(&self.inner)?;
        Ok(Box::new(transaction))
    }

    fn current_version(&self) -> SvipResult<Option<V>> {
        Ok(self.inner.marker.read().current.clone())
    }

    fn set_version(&self, version: &V) -> SvipResult<()> {
        let mut marker = self.inner.marker.write();
        marker.current = Some(version.clone());
        marker.history.push(VersionRecord::new(version.clone()));
        Ok(())
    }

    fn version_history(&self) -> SvipResult<Vec<VersionRecord<V>>> {
        Ok(self.inner.marker.read().history.clone())
    }

    fn register_inconsistency(&self, inconsistency: &Inconsistency) -> SvipResult<()> {
        *self.inner.inconsistency.write() = Some(inconsistency.clone());
        Ok(())
    }

    fn inconsistency(&self) -> SvipResult<Option<Inconsistency>> {
        Ok(self.inner.inconsistency.read().clone())
    }

    fn clear_inconsistency(&self) -> SvipResult<()> {
        *self.inner.inconsistency.write() = None;
        Ok(())
    }
}

struct MemoryBackendInner<V, T> {
    config: MemoryConfig,
    data: Atomic<T>,
    marker: RwLock<VersionMarker<V>>,
    inconsistency: RwLock<Option<Inconsistency>>,
    backups: DashMap<String, MemorySnapshot<V, T>>,
    in_transaction: AtomicBool,
}

impl<V, T> MemoryBackendInner<V, T>
where
    V: Version,
    T: Clone,
{
    fn backup(&self, migration_info: Option<&MigrationInfo<V>>) -> SvipResult<BackupHandle> {
        if !self.config.supports_backup {
            log::error!("Backup requested on memory backend '{}' without backup support", self.config.name);
            return Err(SvipError::new(
                &format!("Memory backend '{}' does not support backups", self.config.name),
                ErrorKind::BackupUnavailable,
            ));
        }

        // data first, then marker: the same order restore writes them
        let data = self.data.read().clone();
        let marker = self.marker.read().clone();
        let handle = BackupHandle::new()
            .with_location(&format!("memory://{}", self.config.name))
            .for_migration(migration_info);

        self.backups.insert(
            handle.id().to_string(),
            MemorySnapshot {
                handle: handle.clone(),
                data,
                marker,
            },
        );
        self.prune();

        log::debug!("Captured {}", handle.info());
        Ok(handle)
    }

    fn restore(&self, handle: &BackupHandle) -> SvipResult<()> {
        let snapshot = self.backups.get(handle.id()).ok_or_else(|| {
            log::error!("Backup {} not found in memory backend '{}'", handle.id(), self.config.name);
            SvipError::new(
                &format!("Backup {} is missing from memory backend '{}'", handle.id(), self.config.name),
                ErrorKind::RestoreFailed,
            )
        })?;

        *self.data.write() = snapshot.data.clone();
        *self.marker.write() = snapshot.marker.clone();

        log::debug!("Restored {}", handle.info());
        Ok(())
    }

    fn begin_transaction(this: &Arc<Self>) -> SvipResult<MemoryTransaction<V, T>> {
        if !this.config.transactional {
            log::error!("Transaction requested on memory backend '{}' without transaction support", this.config.name);
            return Err(SvipError::new(
                &format!("Memory backend '{}' does not support transactions", this.config.name),
                ErrorKind::InvalidOperation,
            ));
        }
        if this.in_transaction.swap(true, Ordering::SeqCst) {
            log::error!("Memory backend '{}' already has an open transaction", this.config.name);
            return Err(SvipError::new(
                &format!("Memory backend '{}' already has an open transaction", this.config.name),
                ErrorKind::InvalidOperation,
            ));
        }

        log::debug!("Began transaction on memory backend '{}'", this.config.name);
        Ok(MemoryTransaction {
            data: this.data.read().clone(),
            marker: this.marker.read().clone(),
            inner: this.clone(),
        })
    }

    fn prune(&self) {
        let max_backups = self.config.max_backups;
        if max_backups == 0 || self.backups.len() <= max_backups {
            return;
        }

        let mut retained: Vec<(String, chrono::DateTime<chrono::Utc>)> = self
            .backups
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().handle.created_at()))
            .collect();
        retained.sort_by_key(|(_, created_at)| *created_at);

        let excess = retained.len() - max_backups;
        for (id, _) in retained.into_iter().take(excess) {
            log::debug!("Dropping backup {} from memory backend '{}'", id, self.config.name);
            self.backups.remove(&id);
        }
    }
}

/// Transaction of a [`MemoryBackend`], a copy of the data and version marker
/// taken when it began.
struct MemoryTransaction<V: Version, T> {
    inner: Arc<MemoryBackendInner<V, T>>,
    data: T,
    marker: VersionMarker<V>,
}

impl<V, T> StateTransaction for MemoryTransaction<V, T>
where
    V: Version,
    T: Clone + Send + Sync + 'static,
{
    fn commit(self: Box<Self>) -> SvipResult<()> {
        log::debug!("Committed transaction on memory backend '{}'", self.inner.config.name);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> SvipResult<()> {
        *self.inner.data.write() = self.data.clone();
        *self.inner.marker.write() = self.marker.clone();
        log::debug!("Rolled back transaction on memory backend '{}'", self.inner.config.name);
        Ok(())
    }
}

impl<V: Version, T> Drop for MemoryTransaction<V, T> {
    fn drop(&mut self) {
        self.inner.in_transaction.store(false, Ordering::SeqCst);
    }
}
