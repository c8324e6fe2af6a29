use svip::backend::{AppStateBackend, MemoryBackend, MemoryConfig, MemoryState};
use svip::errors::{ErrorKind, RestoreOutcome, SvipError, SvipResult};
use svip::migration::{MigrateOptions, MigrationPhase};
use svip::Svip;
use svip_fjall_adapter::FjallBackend;
use svip_int_test::test_util::{cleanup, create_test_context, run_test, FlakyBackend};
use svip_int_test::users::{add_field, load, rename_field_failing, sample_users, seed, UserV1, UserV2};

type Backend = FlakyBackend<FjallBackend<u32>>;

fn failing_svip(backend: &Backend) -> SvipResult<Svip<u32, Backend>> {
    Svip::builder(backend.clone())
        .initial_version(1)
        .add_migration(1, 2, add_field)
        .add_migration(2, 3, rename_field_failing)
        .build()
}

// ==================== Restore ====================

#[test]
fn test_failed_step_restores_backup_once() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            seed(&backend.state()?, &sample_users())?;
            let svip = failing_svip(&backend)?;

            let err = svip.migrate(&3, MigrateOptions::default()).unwrap_err();

            assert_eq!(err.kind(), &ErrorKind::MigrationAborted(RestoreOutcome::Restored));
            assert!(err.restore_ok());
            assert_eq!(err.root_cause().message(), "duplicate full_name");
            assert_eq!(backend.backup_calls(), 1);
            assert_eq!(backend.restore_calls(), 1);
            assert_eq!(svip.current_version()?, 1);
            assert_eq!(svip.phase(), MigrationPhase::AbortedRestored);
            assert_eq!(svip.inconsistency()?, None);

            let users = load::<UserV1>(&backend.state()?)?;
            assert_eq!(users.len(), 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_restore_failure_marks_state_inconsistent() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            seed(&backend.state()?, &sample_users())?;
            backend.fail_restore(true);
            let svip = failing_svip(&backend)?;

            let err = svip.migrate(&3, MigrateOptions::default()).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::RestoreFailed);
            assert!(!err.restore_ok());
            assert_eq!(backend.restore_calls(), 1);
            assert_eq!(svip.phase(), MigrationPhase::AbortedRestoreFailed);

            let inconsistency = svip.inconsistency()?.expect("inconsistency registered");
            assert!(inconsistency.backup_info().is_some());

            let err = svip.migrate(&2, MigrateOptions::default()).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InconsistentState);
            assert_eq!(backend.restore_calls(), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_clearing_inconsistency_allows_migration() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            backend.fail_restore(true);
            let svip = failing_svip(&backend)?;
            svip.migrate(&3, MigrateOptions::default()).unwrap_err();

            // operator repaired the store by hand
            backend.fail_restore(false);
            svip.clear_inconsistency()?;
            assert_eq!(svip.inconsistency()?, None);

            assert_eq!(svip.current_version()?, 2);
            let result = svip.migrate(&2, MigrateOptions::default())?;
            assert_eq!(*result.final_version(), 2);
            assert_eq!(result.steps_applied(), 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_failure_without_backup() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            seed(&backend.state()?, &sample_users())?;
            let svip = failing_svip(&backend)?;

            let err = svip
                .migrate(&3, MigrateOptions::new().save_backup(false))
                .unwrap_err();

            assert_eq!(err.kind(), &ErrorKind::MigrationAborted(RestoreOutcome::NoBackup));
            assert!(!err.restore_ok());
            assert_eq!(backend.backup_calls(), 0);
            assert_eq!(backend.restore_calls(), 0);
            assert_eq!(svip.phase(), MigrationPhase::AbortedUnrestored);
            assert!(svip.inconsistency()?.is_some());
            // addField committed before the failure
            assert_eq!(svip.current_version()?, 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_backup_failure_applies_nothing() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            backend.fail_backup(true);
            let svip = failing_svip(&backend)?;

            let err = svip.migrate(&2, MigrateOptions::default()).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::BackupFailed);
            assert_eq!(svip.current_version()?, 1);
            assert!(svip.version_history()?.is_empty());
            assert_eq!(backend.restore_calls(), 0);
            Ok(())
        },
        cleanup,
    )
}

// ==================== Standalone backups ====================

#[test]
fn test_standalone_backup() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            seed(&backend.state()?, &sample_users())?;
            let svip = failing_svip(&backend)?;
            svip.migrate(&2, MigrateOptions::default())?;

            let handle = svip.backup(Some("before-release"))?;
            assert_eq!(handle.label(), Some("before-release"));
            assert!(handle.is_standalone());

            let unnamed = svip.backup(None)?;
            assert_eq!(unnamed.label(), None);

            backend.set_version(&7)?;
            backend.restore(&handle)?;
            assert_eq!(svip.current_version()?, 2);
            assert_eq!(load::<UserV2>(&backend.state()?)?.len(), 2);
            Ok(())
        },
        cleanup,
    )
}

// ==================== Transactions ====================

fn add_grace(state: MemoryState<Vec<String>>) -> SvipResult<MemoryState<Vec<String>>> {
    state.write().push("grace".to_string());
    Ok(state)
}

#[test]
fn test_transactional_backend_rolls_back_without_restoring() -> SvipResult<()> {
    let memory: MemoryBackend<u32, Vec<String>> =
        MemoryBackend::with_config(vec!["ada".to_string()], MemoryConfig::new().transactional(true));
    let backend = FlakyBackend::new(memory.clone());
    let svip = Svip::builder(backend.clone())
        .initial_version(1)
        .add_migration(1, 2, add_grace)
        .add_migration(2, 3, |_| Err(SvipError::new("duplicate full_name", ErrorKind::BackendError)))
        .build()?;

    let err = svip.migrate(&3, MigrateOptions::default()).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::MigrationAborted(RestoreOutcome::RolledBack));
    assert!(err.restore_ok());
    assert_eq!(err.root_cause().message(), "duplicate full_name");
    assert_eq!(backend.backup_calls(), 1);
    assert_eq!(backend.restore_calls(), 0);
    assert_eq!(svip.current_version()?, 1);
    assert_eq!(memory.data().snapshot(), vec!["ada".to_string()]);
    assert_eq!(svip.phase(), MigrationPhase::AbortedRolledBack);
    assert_eq!(svip.inconsistency()?, None);

    let svip = Svip::builder(backend.clone())
        .initial_version(1)
        .add_migration(1, 2, add_grace)
        .build()?;
    svip.migrate(&2, MigrateOptions::default())?;
    assert_eq!(memory.data().snapshot(), vec!["ada".to_string(), "grace".to_string()]);
    assert_eq!(memory.current_version()?, Some(2));
    Ok(())
}
