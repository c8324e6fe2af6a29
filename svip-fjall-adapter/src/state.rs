use crate::config::FjallConfig;
use crate::wrapper::{decode, encode, to_svip_error};
use fjall::{Keyspace, PartitionHandle, PersistMode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use svip::errors::{ErrorKind, SvipError, SvipResult};

/// Partition holding the version marker and the version history.
pub(crate) const VERSIONING_PARTITION: &str = "svip_versioning";

/// Partition holding the inconsistency marker, never backed up nor restored.
pub(crate) const MARKERS_PARTITION: &str = "svip_markers";

/// Partition describing the content of a backup keyspace.
pub(crate) const MANIFEST_PARTITION: &str = "svip_backup_manifest";

pub(crate) fn is_internal_partition(name: &str) -> bool {
    name == VERSIONING_PARTITION || name == MARKERS_PARTITION || name == MANIFEST_PARTITION
}

/// State handle migration steps receive from a [`crate::FjallBackend`].
///
/// Steps open the partitions they work on by name. Partitions used internally by
/// the backend are not reachable through it.
#[derive(Clone)]
pub struct FjallState {
    keyspace: Keyspace,
    config: FjallConfig,
}

impl FjallState {
    pub(crate) fn new(keyspace: Keyspace, config: FjallConfig) -> Self {
        FjallState { keyspace, config }
    }

    /// Opens or creates the partition `name`.
    pub fn partition(&self, name: &str) -> SvipResult<PartitionHandle> {
        Self::check_name(name)?;
        self.keyspace
            .open_partition(name, self.config.partition_config())
            .map_err(|err| {
                log::error!("Failed to open partition {}: {}", name, err);
                to_svip_error(err)
            })
    }

    pub fn has_partition(&self, name: &str) -> bool {
        !is_internal_partition(name) && self.keyspace.partition_exists(name)
    }

    /// Drops the partition `name` and its content.
    pub fn remove_partition(&self, name: &str) -> SvipResult<()> {
        if !self.has_partition(name) {
            return Ok(());
        }
        let partition = self.partition(name)?;
        self.keyspace.delete_partition(partition).map_err(|err| {
            log::error!("Failed to remove partition {}: {}", name, err);
            to_svip_error(err)
        })
    }

    /// Names of the application partitions, internal ones excluded.
    pub fn partition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .keyspace
            .list_partitions()
            .iter()
            .map(|name| name.to_string())
            .filter(|name| !is_internal_partition(name))
            .collect();
        names.sort();
        names
    }

    /// Stores `value` bincode-encoded under `key`.
    pub fn put<T: Serialize + ?Sized>(&self, partition: &PartitionHandle, key: &str, value: &T) -> SvipResult<()> {
        let bytes = encode(value)?;
        partition.insert(key, bytes).map_err(to_svip_error)
    }

    /// Reads a value stored with [`FjallState::put`].
    pub fn get<T: DeserializeOwned>(&self, partition: &PartitionHandle, key: &str) -> SvipResult<Option<T>> {
        match partition.get(key).map_err(to_svip_error)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes `key` from `partition`.
    pub fn remove(&self, partition: &PartitionHandle, key: &str) -> SvipResult<()> {
        partition.remove(key).map_err(to_svip_error)
    }

    /// Syncs all written data to disk.
    pub fn persist(&self) -> SvipResult<()> {
        self.keyspace.persist(PersistMode::SyncAll).map_err(|err| {
            log::error!("Failed to persist keyspace: {}", err);
            to_svip_error(err)
        })
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    fn check_name(name: &str) -> SvipResult<()> {
        if is_internal_partition(name) {
            log::error!("Partition {} is reserved", name);
            return Err(SvipError::new(
                &format!("Partition {} is reserved for the backend", name),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }
}
