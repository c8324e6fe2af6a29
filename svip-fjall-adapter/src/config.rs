use fjall::{Config, PartitionCreateOptions};
use std::path::{Path, PathBuf};
use svip_derive::BackendAttributes;

/// Fjall backend configuration.
///
/// Built through [`crate::FjallBackendBuilder`]; every field is listed by the
/// backend's `info()` except the ones marked skipped.
#[derive(Debug, Clone, BackendAttributes)]
pub struct FjallConfig {
    #[attribute(display)]
    db_path: String,
    #[attribute(display)]
    backups_dir: String,
    max_backups: usize,
    #[attribute(skip)]
    supports_backup: bool,
    fsync_on_version_update: bool,
    #[attribute(rename = "cache_size_bytes")]
    cache_size: u64,
    #[attribute(rename = "write_buffer_bytes")]
    max_write_buffer_size: u64,
    #[attribute(rename = "journal_bytes")]
    max_journaling_size: u64,
    #[attribute(rename = "memtable_bytes")]
    max_memtable_size: u32,
    flush_workers: usize,
    compaction_workers: usize,
}

impl FjallConfig {
    /// Default block cache size: 64 MB.
    pub const DEFAULT_CACHE_MB: u64 = 64;

    /// Default write buffer size: 64 MB.
    pub const DEFAULT_WRITE_BUFFER_MB: u64 = 64;

    /// Default max journaling size: 512 MB.
    pub const DEFAULT_MAX_JOURNALING_MB: u64 = 512;

    /// Default memtable size: 16 MB.
    pub const DEFAULT_MEMTABLE_MB: u32 = 16;

    /// Backups kept unless configured otherwise.
    pub const DEFAULT_MAX_BACKUPS: usize = 5;

    pub fn new() -> FjallConfig {
        let cpus = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(4);

        FjallConfig {
            db_path: String::new(),
            backups_dir: String::new(),
            max_backups: Self::DEFAULT_MAX_BACKUPS,
            supports_backup: true,
            fsync_on_version_update: true,
            cache_size: Self::DEFAULT_CACHE_MB * 1024 * 1024,
            max_write_buffer_size: Self::DEFAULT_WRITE_BUFFER_MB * 1024 * 1024,
            max_journaling_size: Self::DEFAULT_MAX_JOURNALING_MB * 1024 * 1024,
            max_memtable_size: Self::DEFAULT_MEMTABLE_MB * 1024 * 1024,
            flush_workers: cpus.max(1),
            compaction_workers: (cpus / 2).max(1),
        }
    }

    /// Builds the Fjall keyspace configuration for the keyspace at `path`.
    ///
    /// Live and backup keyspaces share the same tuning.
    pub(crate) fn keyspace_config<P: AsRef<Path>>(&self, path: P) -> Config {
        Config::new(path)
            .cache_size(self.cache_size)
            .max_write_buffer_size(self.max_write_buffer_size)
            .max_journaling_size(self.max_journaling_size)
            .flush_workers(self.flush_workers)
            .compaction_workers(self.compaction_workers)
    }

    pub(crate) fn partition_config(&self) -> PartitionCreateOptions {
        PartitionCreateOptions::default().max_memtable_size(self.max_memtable_size)
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub(crate) fn set_db_path(&mut self, db_path: &str) {
        self.db_path = db_path.to_string();
    }

    /// Directory holding one sub-directory per backup.
    ///
    /// Defaults to `<db_path>.backups` next to the live keyspace.
    pub fn backups_dir(&self) -> PathBuf {
        if self.backups_dir.is_empty() {
            PathBuf::from(format!("{}.backups", self.db_path.trim_end_matches(['/', '\\'])))
        } else {
            PathBuf::from(&self.backups_dir)
        }
    }

    pub(crate) fn set_backups_dir(&mut self, backups_dir: &str) {
        self.backups_dir = backups_dir.to_string();
    }

    /// Number of backups kept on disk, oldest removed first. `0` keeps all of them.
    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    pub(crate) fn set_max_backups(&mut self, max_backups: usize) {
        self.max_backups = max_backups;
    }

    pub fn supports_backup(&self) -> bool {
        self.supports_backup
    }

    pub(crate) fn set_supports_backup(&mut self, supports_backup: bool) {
        self.supports_backup = supports_backup;
    }

    /// Whether every version update is synced to disk before returning.
    pub fn fsync_on_version_update(&self) -> bool {
        self.fsync_on_version_update
    }

    pub(crate) fn set_fsync_on_version_update(&mut self, fsync: bool) {
        self.fsync_on_version_update = fsync;
    }

    pub fn cache_size(&self) -> u64 {
        self.cache_size
    }

    pub(crate) fn set_cache_size(&mut self, cache_size: u64) {
        self.cache_size = cache_size;
    }

    pub fn max_write_buffer_size(&self) -> u64 {
        self.max_write_buffer_size
    }

    pub(crate) fn set_max_write_buffer_size(&mut self, size: u64) {
        self.max_write_buffer_size = size;
    }

    pub fn max_journaling_size(&self) -> u64 {
        self.max_journaling_size
    }

    pub(crate) fn set_max_journaling_size(&mut self, size: u64) {
        self.max_journaling_size = size;
    }

    pub fn max_memtable_size(&self) -> u32 {
        self.max_memtable_size
    }

    pub(crate) fn set_max_memtable_size(&mut self, size: u32) {
        self.max_memtable_size = size;
    }

    pub fn flush_workers(&self) -> usize {
        self.flush_workers
    }

    pub(crate) fn set_flush_workers(&mut self, count: usize) {
        self.flush_workers = count;
    }

    pub fn compaction_workers(&self) -> usize {
        self.compaction_workers
    }

    pub(crate) fn set_compaction_workers(&mut self, count: usize) {
        self.compaction_workers = count;
    }
}

impl Default for FjallConfig {
    fn default() -> Self {
        FjallConfig::new()
    }
}
