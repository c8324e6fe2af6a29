use crate::config::FjallConfig;
use crate::state::{is_internal_partition, FjallState, MANIFEST_PARTITION, MARKERS_PARTITION, VERSIONING_PARTITION};
use crate::version::engine_version;
use crate::wrapper::{decode, encode, to_svip_error};
use fjall::{Keyspace, PartitionHandle, PersistMode};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::marker::PhantomData;
use std::ops::RangeFull;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use svip::backend::{AppStateBackend, BackendAttributes, BackupHandle, Inconsistency, VersionRecord};
use svip::errors::{ErrorKind, SvipError, SvipResult};
use svip::migration::MigrationInfo;
use svip::Version;

const CURRENT_VERSION_KEY: &str = "current_version";
const VERSION_HISTORY_KEY: &str = "version_history";
const INCONSISTENCY_KEY: &str = "inconsistency";
const MANIFEST_PARTITIONS_KEY: &str = "partitions";
const MANIFEST_HANDLE_KEY: &str = "handle";

/// Bound on the version type of a [`FjallBackend`].
pub trait FjallVersion: Version + Serialize + DeserializeOwned {}

impl<T> FjallVersion for T where T: Version + Serialize + DeserializeOwned {}

/// Application state stored in a Fjall keyspace.
///
/// The version marker and the version history live in a dedicated partition of
/// the same keyspace. A backup is a full copy of the keyspace (marker included)
/// into its own directory under [`FjallConfig::backups_dir`], so restoring it rolls
/// back data and version together.
///
/// # Examples
///
/// ```rust,ignore
/// use svip_fjall_adapter::FjallBackend;
///
/// let backend: FjallBackend<u32> = FjallBackend::with_config()
///     .db_path("/var/lib/app/state")
///     .max_backups(3)
///     .build()?;
/// ```
pub struct FjallBackend<V: FjallVersion> {
    inner: Arc<FjallBackendInner<V>>,
}

impl<V: FjallVersion> FjallBackend<V> {
    /// Creates a builder for configuring a Fjall backend.
    #[inline]
    pub fn with_config() -> FjallBackendBuilder<V> {
        FjallBackendBuilder::new()
    }

    fn open(config: FjallConfig) -> SvipResult<Self> {
        if config.db_path().trim().is_empty() {
            log::error!("Fjall backend opened without a database path");
            return Err(SvipError::new(
                "Fjall backend requires a database path",
                ErrorKind::ValidationError,
            ));
        }

        let keyspace = Keyspace::open(config.keyspace_config(config.db_path())).map_err(|err| {
            log::error!("Failed to open or create keyspace at {}: {}", config.db_path(), err);
            to_svip_error(err)
        })?;
        let versioning = keyspace
            .open_partition(VERSIONING_PARTITION, config.partition_config())
            .map_err(to_svip_error)?;
        let markers = keyspace
            .open_partition(MARKERS_PARTITION, config.partition_config())
            .map_err(to_svip_error)?;

        log::debug!("Opened Fjall backend at {}", config.db_path());
        Ok(FjallBackend {
            inner: Arc::new(FjallBackendInner {
                config,
                keyspace,
                versioning,
                markers,
                maintenance_lock: Mutex::new(()),
                _version: PhantomData,
            }),
        })
    }

    pub fn config(&self) -> &FjallConfig {
        &self.inner.config
    }

    /// Directories of the backups kept on disk, oldest first.
    pub fn backup_locations(&self) -> SvipResult<Vec<PathBuf>> {
        self.inner.backup_locations()
    }

    /// Syncs the live keyspace to disk.
    pub fn persist(&self) -> SvipResult<()> {
        self.inner.persist()
    }
}

impl<V: FjallVersion> Clone for FjallBackend<V> {
    fn clone(&self) -> Self {
        FjallBackend {
            inner: self.inner.clone(),
        }
    }
}

impl<V: FjallVersion> BackendAttributes for FjallBackend<V> {
    fn attributes(&self) -> Vec<(String, String)> {
        let mut attributes = self.inner.config.attributes();
        match engine_version() {
            Ok(version) => attributes.push(("engine".to_string(), format!("Fjall/{}", version))),
            Err(e) => log::warn!("Failed to determine Fjall version: {}", e),
        }
        attributes
    }
}

impl<V: FjallVersion> AppStateBackend<V> for FjallBackend<V> {
    type State = FjallState;

    fn state(&self) -> SvipResult<FjallState> {
        Ok(FjallState::new(self.inner.keyspace.clone(), self.inner.config.clone()))
    }

    fn supports_backup(&self) -> bool {
        self.inner.config.supports_backup()
    }

    fn backup(&self, migration_info: Option<&MigrationInfo<V>>) -> SvipResult<BackupHandle> {
        self.inner.backup(migration_info)
    }

    fn restore(&self, handle: &BackupHandle) -> SvipResult<()> {
        self.inner.restore(handle)
    }

    fn current_version(&self) -> SvipResult<Option<V>> {
        self.inner.read(&self.inner.versioning, CURRENT_VERSION_KEY)
    }

    fn set_version(&self, version: &V) -> SvipResult<()> {
        self.inner.set_version(version)
    }

    fn version_history(&self) -> SvipResult<Vec<VersionRecord<V>>> {
        Ok(self
            .inner
            .read(&self.inner.versioning, VERSION_HISTORY_KEY)?
            .unwrap_or_default())
    }

    fn register_inconsistency(&self, inconsistency: &Inconsistency) -> SvipResult<()> {
        self.inner
            .markers
            .insert(INCONSISTENCY_KEY, encode(inconsistency)?)
            .map_err(to_svip_error)?;
        self.inner.persist()
    }

    fn inconsistency(&self) -> SvipResult<Option<Inconsistency>> {
        self.inner.read(&self.inner.markers, INCONSISTENCY_KEY)
    }

    fn clear_inconsistency(&self) -> SvipResult<()> {
        self.inner.markers.remove(INCONSISTENCY_KEY).map_err(to_svip_error)?;
        self.inner.persist()
    }
}

struct FjallBackendInner<V> {
    config: FjallConfig,
    keyspace: Keyspace,
    versioning: PartitionHandle,
    markers: PartitionHandle,
    maintenance_lock: Mutex<()>,
    _version: PhantomData<fn() -> V>,
}

impl<V: FjallVersion> FjallBackendInner<V> {
    fn read<T: DeserializeOwned>(&self, partition: &PartitionHandle, key: &str) -> SvipResult<Option<T>> {
        match partition.get(key).map_err(to_svip_error)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn persist(&self) -> SvipResult<()> {
        self.keyspace.persist(PersistMode::SyncAll).map_err(|err| {
            log::error!("Failed to persist keyspace: {}", err);
            to_svip_error(err)
        })
    }

    fn set_version(&self, version: &V) -> SvipResult<()> {
        let mut history: Vec<VersionRecord<V>> = self
            .read(&self.versioning, VERSION_HISTORY_KEY)?
            .unwrap_or_default();
        history.push(VersionRecord::new(version.clone()));

        let mut batch = self.keyspace.batch();
        batch.insert(&self.versioning, CURRENT_VERSION_KEY, encode(version)?);
        batch.insert(&self.versioning, VERSION_HISTORY_KEY, encode(&history)?);
        batch.commit().map_err(|err| {
            log::error!("Failed to write version {}: {}", version, err);
            to_svip_error(err)
        })?;

        if self.config.fsync_on_version_update() {
            self.persist()?;
        }
        Ok(())
    }

    fn live_partitions(&self) -> Vec<String> {
        self.keyspace
            .list_partitions()
            .iter()
            .map(|name| name.to_string())
            .filter(|name| name.as_str() != MARKERS_PARTITION && name.as_str() != MANIFEST_PARTITION)
            .collect()
    }

    fn backup(&self, migration_info: Option<&MigrationInfo<V>>) -> SvipResult<BackupHandle> {
        if !self.config.supports_backup() {
            log::error!("Backup requested on Fjall backend {} without backup support", self.config.db_path());
            return Err(SvipError::new(
                &format!("Fjall backend at {} does not support backups", self.config.db_path()),
                ErrorKind::BackupUnavailable,
            ));
        }
        let _guard = self.maintenance_lock.lock();

        let handle = BackupHandle::new().for_migration(migration_info);
        let location = self.config.backups_dir().join(format!(
            "{}-{}",
            handle.created_at().format("%Y%m%dT%H%M%S%.6fZ"),
            handle.id()
        ));
        let handle = handle.with_location(&location.to_string_lossy());

        if let Err(e) = self.copy_to(&location, &handle) {
            log::error!("Failed to back up {} to {}: {}", self.config.db_path(), location.display(), e);
            if let Err(cleanup) = fs::remove_dir_all(&location) {
                log::warn!("Failed to remove incomplete backup {}: {}", location.display(), cleanup);
            }
            return Err(e);
        }

        self.prune()?;
        log::debug!("Captured {}", handle.info());
        Ok(handle)
    }

    fn copy_to(&self, location: &Path, handle: &BackupHandle) -> SvipResult<()> {
        fs::create_dir_all(self.config.backups_dir())?;
        let backup = Keyspace::open(self.config.keyspace_config(location)).map_err(to_svip_error)?;

        let partitions = self.live_partitions();
        for name in &partitions {
            let source = self
                .keyspace
                .open_partition(name, self.config.partition_config())
                .map_err(to_svip_error)?;
            let target = backup
                .open_partition(name, self.config.partition_config())
                .map_err(to_svip_error)?;

            let mut batch = backup.batch();
            for entry in source.range::<Vec<u8>, RangeFull>(..) {
                let (key, value) = entry.map_err(to_svip_error)?;
                batch.insert(&target, key, value);
            }
            batch.commit().map_err(to_svip_error)?;
        }

        let manifest = backup
            .open_partition(MANIFEST_PARTITION, self.config.partition_config())
            .map_err(to_svip_error)?;
        let mut batch = backup.batch();
        batch.insert(&manifest, MANIFEST_PARTITIONS_KEY, encode(&partitions)?);
        batch.insert(&manifest, MANIFEST_HANDLE_KEY, encode(handle)?);
        batch.commit().map_err(to_svip_error)?;

        backup.persist(PersistMode::SyncAll).map_err(to_svip_error)
    }

    fn restore(&self, handle: &BackupHandle) -> SvipResult<()> {
        let _guard = self.maintenance_lock.lock();
        self.restore_from(handle).map_err(|e| {
            log::error!("Failed to restore {}: {}", handle.info(), e);
            if *e.kind() == ErrorKind::RestoreFailed {
                e
            } else {
                SvipError::new_with_cause(
                    &format!("Failed to restore backup {}", handle.id()),
                    ErrorKind::RestoreFailed,
                    e,
                )
            }
        })
    }

    fn restore_from(&self, handle: &BackupHandle) -> SvipResult<()> {
        let location = handle.location().map(PathBuf::from).ok_or_else(|| {
            SvipError::new(
                &format!("Backup {} has no location", handle.id()),
                ErrorKind::RestoreFailed,
            )
        })?;
        if !location.is_dir() {
            return Err(SvipError::new(
                &format!("Backup {} is missing from {}", handle.id(), location.display()),
                ErrorKind::RestoreFailed,
            ));
        }

        let backup = Keyspace::open(self.config.keyspace_config(&location)).map_err(to_svip_error)?;
        if !backup.partition_exists(MANIFEST_PARTITION) {
            return Err(SvipError::new(
                &format!("Backup {} at {} has no manifest", handle.id(), location.display()),
                ErrorKind::RestoreFailed,
            ));
        }
        let manifest = backup
            .open_partition(MANIFEST_PARTITION, self.config.partition_config())
            .map_err(to_svip_error)?;

        let recorded: BackupHandle = self.read(&manifest, MANIFEST_HANDLE_KEY)?.ok_or_else(|| {
            SvipError::new(
                &format!("Backup manifest at {} is corrupt", location.display()),
                ErrorKind::RestoreFailed,
            )
        })?;
        if recorded.id() != handle.id() {
            return Err(SvipError::new(
                &format!(
                    "Backup at {} belongs to backup {}, not {}",
                    location.display(),
                    recorded.id(),
                    handle.id()
                ),
                ErrorKind::RestoreFailed,
            ));
        }
        let partitions: Vec<String> = self.read(&manifest, MANIFEST_PARTITIONS_KEY)?.ok_or_else(|| {
            SvipError::new(
                &format!("Backup manifest at {} lists no partitions", location.display()),
                ErrorKind::RestoreFailed,
            )
        })?;

        for name in self.live_partitions() {
            if !partitions.contains(&name) && !is_internal_partition(&name) {
                let partition = self
                    .keyspace
                    .open_partition(&name, self.config.partition_config())
                    .map_err(to_svip_error)?;
                self.keyspace.delete_partition(partition).map_err(to_svip_error)?;
                log::debug!("Removed partition {} created after the backup", name);
            }
        }

        // one batch for every partition: the content and the version marker land together
        let mut batch = self.keyspace.batch();
        for name in &partitions {
            let source = backup
                .open_partition(name, self.config.partition_config())
                .map_err(to_svip_error)?;
            let target = self
                .keyspace
                .open_partition(name, self.config.partition_config())
                .map_err(to_svip_error)?;

            let mut restored_keys = HashSet::new();
            for entry in source.range::<Vec<u8>, RangeFull>(..) {
                let (key, value) = entry.map_err(to_svip_error)?;
                restored_keys.insert(key.to_vec());
                batch.insert(&target, key, value);
            }
            for entry in target.range::<Vec<u8>, RangeFull>(..) {
                let (key, _) = entry.map_err(to_svip_error)?;
                if !restored_keys.contains(&*key) {
                    batch.remove(&target, key);
                }
            }
        }
        batch.commit().map_err(to_svip_error)?;
        self.persist()?;

        log::debug!("Restored {}", handle.info());
        Ok(())
    }

    fn backup_locations(&self) -> SvipResult<Vec<PathBuf>> {
        let dir = self.config.backups_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut locations = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                locations.push(path);
            }
        }
        // names start with the capture timestamp
        locations.sort();
        Ok(locations)
    }

    fn prune(&self) -> SvipResult<()> {
        let max_backups = self.config.max_backups();
        if max_backups == 0 {
            return Ok(());
        }
        let locations = self.backup_locations()?;
        if locations.len() <= max_backups {
            return Ok(());
        }
        let excess = locations.len() - max_backups;
        for location in locations.into_iter().take(excess) {
            log::debug!("Removing old backup {}", location.display());
            if let Err(e) = fs::remove_dir_all(&location) {
                log::warn!("Failed to remove old backup {}: {}", location.display(), e);
            }
        }
        Ok(())
    }
}

/// Builder for a [`FjallBackend`].
pub struct FjallBackendBuilder<V: FjallVersion> {
    config: FjallConfig,
    _version: PhantomData<fn() -> V>,
}

impl<V: FjallVersion> FjallBackendBuilder<V> {
    #[inline]
    pub fn new() -> Self {
        FjallBackendBuilder {
            config: FjallConfig::new(),
            _version: PhantomData,
        }
    }

    /// Settings for memory-constrained environments.
    #[inline]
    pub fn low_memory_preset(self) -> Self {
        self.cache_size(16 * 1024 * 1024)
            .max_write_buffer_size(16 * 1024 * 1024)
            .max_memtable_size(4 * 1024 * 1024)
            .flush_workers(1)
            .compaction_workers(1)
    }

    #[inline]
    pub fn db_path(mut self, db_path: &str) -> Self {
        self.config.set_db_path(db_path);
        self
    }

    #[inline]
    pub fn backups_dir(mut self, backups_dir: &str) -> Self {
        self.config.set_backups_dir(backups_dir);
        self
    }

    #[inline]
    pub fn max_backups(mut self, max_backups: usize) -> Self {
        self.config.set_max_backups(max_backups);
        self
    }

    #[inline]
    pub fn supports_backup(mut self, supports_backup: bool) -> Self {
        self.config.set_supports_backup(supports_backup);
        self
    }

    #[inline]
    pub fn fsync_on_version_update(mut self, fsync: bool) -> Self {
        self.config.set_fsync_on_version_update(fsync);
        self
    }

    #[inline]
    pub fn cache_size(mut self, cache_size: u64) -> Self {
        self.config.set_cache_size(cache_size);
        self
    }

    #[inline]
    pub fn max_write_buffer_size(mut self, size: u64) -> Self {
        self.config.set_max_write_buffer_size(size);
        self
    }

    #[inline]
    pub fn max_journaling_size(mut self, size: u64) -> Self {
        self.config.set_max_journaling_size(size);
        self
    }

    #[inline]
    pub fn max_memtable_size(mut self, size: u32) -> Self {
        self.config.set_max_memtable_size(size);
        self
    }

    #[inline]
    pub fn flush_workers(mut self, count: usize) -> Self {
        self.config.set_flush_workers(count);
        self
    }

    #[inline]
    pub fn compaction_workers(mut self, count: usize) -> Self {
        self.config.set_compaction_workers(count);
        self
    }

    /// Opens or creates the keyspace.
    pub fn build(self) -> SvipResult<FjallBackend<V>> {
        FjallBackend::open(self.config)
    }
}

impl<V: FjallVersion> Default for FjallBackendBuilder<V> {
    fn default() -> Self {
        FjallBackendBuilder::new()
    }
}
