use std::collections::BTreeMap;
use svip::backend::{AppStateBackend, BackendAttributes, BackupHandle};
use svip::errors::{ErrorKind, SvipError, SvipResult};
use svip::migration::MigrationInfo;
use svip_derive::BackendAttributes;

#[derive(Debug, Clone, BackendAttributes)]
struct ObjectStoreSettings {
    #[attribute(display)]
    bucket: String,
    region: Option<String>,
    #[attribute(skip)]
    access_key: String,
    #[attribute(rename = "timeout_secs")]
    timeout: u64,
}

#[derive(BackendAttributes)]
struct Marker;

/// Backend without backups whose attributes come from its settings.
struct ReadOnlyBackend {
    settings: ObjectStoreSettings,
}

impl BackendAttributes for ReadOnlyBackend {
    fn attributes(&self) -> Vec<(String, String)> {
        self.settings.attributes()
    }
}

impl AppStateBackend<u32> for ReadOnlyBackend {
    type State = ();

    fn state(&self) -> SvipResult<()> {
        Ok(())
    }

    fn supports_backup(&self) -> bool {
        false
    }

    fn backup(&self, _migration_info: Option<&MigrationInfo<u32>>) -> SvipResult<BackupHandle> {
        Err(SvipError::new("read-only", ErrorKind::BackupUnavailable))
    }

    fn restore(&self, _handle: &BackupHandle) -> SvipResult<()> {
        Err(SvipError::new("read-only", ErrorKind::RestoreFailed))
    }

    fn current_version(&self) -> SvipResult<Option<u32>> {
        Ok(Some(4))
    }

    fn set_version(&self, _version: &u32) -> SvipResult<()> {
        Err(SvipError::new("read-only", ErrorKind::InvalidOperation))
    }
}

fn settings() -> ObjectStoreSettings {
    ObjectStoreSettings {
        bucket: "app-state".to_string(),
        region: Some("eu-west-1".to_string()),
        access_key: "AKIA0000".to_string(),
        timeout: 30,
    }
}

#[test]
fn test_derived_attributes() {
    let attributes = settings().attributes();
    assert_eq!(
        attributes,
        vec![
            ("bucket".to_string(), "app-state".to_string()),
            ("region".to_string(), "Some(\"eu-west-1\")".to_string()),
            ("timeout_secs".to_string(), "30".to_string()),
        ]
    );
}

#[test]
fn test_unit_struct_has_no_attributes() {
    assert!(Marker.attributes().is_empty());
}

#[test]
fn test_backend_info_lists_derived_attributes() {
    let backend = ReadOnlyBackend { settings: settings() };
    let info: BTreeMap<String, String> = backend.info();

    assert_eq!(info.get("backend").map(String::as_str), Some("ReadOnlyBackend"));
    assert_eq!(info.get("supports_backup").map(String::as_str), Some("false"));
    assert_eq!(info.get("bucket").map(String::as_str), Some("app-state"));
    assert!(!info.contains_key("access_key"));
}

#[test]
fn test_backup_unavailable_through_svip() {
    let svip = svip::Svip::builder(ReadOnlyBackend { settings: settings() })
        .add_migration(4, 5, |state| Ok(state))
        .build()
        .unwrap();

    let err = svip.backup(None).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::BackupUnavailable);

    let err = svip.migrate(&5, Default::default()).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::BackupUnavailable);
    assert_eq!(svip.current_version().unwrap(), 4);
}
