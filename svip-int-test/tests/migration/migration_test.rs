use svip::errors::{ErrorKind, SvipResult};
use svip::migration::{MigrateOptions, MigrationPhase, StepStatus};
use svip::Svip;
use svip_fjall_adapter::{FjallBackend, FjallState};
use svip_int_test::test_util::{cleanup, create_test_context, run_test, FlakyBackend, RecordingReporter};
use svip_int_test::users::{
    downgrade_steps, load, rename_field_failing, sample_users, seed, upgrade_steps, UserV1, UserV3,
};

type Backend = FlakyBackend<FjallBackend<u32>>;

fn svip(backend: &Backend, reporter: &RecordingReporter<u32>) -> SvipResult<Svip<u32, Backend>> {
    let mut builder = Svip::builder(backend.clone())
        .initial_version(1)
        .reporter(reporter.clone());
    for step in upgrade_steps().into_iter().chain(downgrade_steps()) {
        builder = builder.add_step(step);
    }
    builder.build()
}

fn state(backend: &Backend) -> SvipResult<FjallState> {
    use svip::backend::AppStateBackend;
    backend.state()
}

// ==================== Upgrades ====================

#[test]
fn test_migrate_applies_steps_in_order() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            seed(&state(&backend)?, &sample_users())?;
            let reporter = RecordingReporter::new();
            let svip = svip(&backend, &reporter)?;

            let result = svip.migrate(&3, MigrateOptions::new().verbose(true))?;

            assert_eq!(result.steps_applied(), 2);
            assert_eq!(*result.final_version(), 3);
            assert_eq!(svip.current_version()?, 3);
            assert_eq!(reporter.completed(), vec!["addField", "renameField"]);
            assert_eq!(backend.backup_calls(), 1);
            assert!(result.backup().is_some());

            let users = load::<UserV3>(&state(&backend)?)?;
            assert_eq!(users.len(), 2);
            assert_eq!(users[0].1.full_name, "Alice");
            assert_eq!(users[0].1.email, None);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_migrate_to_current_version_is_noop() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            let svip = svip(&backend, &RecordingReporter::new())?;

            let result = svip.migrate(&1, MigrateOptions::default())?;
            assert_eq!(result.steps_applied(), 0);
            assert_eq!(backend.backup_calls(), 0);
            assert!(svip.version_history()?.is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_verbose_progress_events() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            let reporter = RecordingReporter::new();
            let svip = svip(&backend, &reporter)?;

            svip.migrate(&3, MigrateOptions::new().verbose(true))?;

            let events = reporter.events();
            assert_eq!(events.len(), 4);
            assert_eq!(events[0].step_index, 1);
            assert_eq!(events[0].total_steps, 2);
            assert_eq!(events[0].status, StepStatus::Started);
            assert_eq!(events[3].target_version, 3);
            assert_eq!(events[3].status, StepStatus::Completed);
            assert_eq!(reporter.phases().last(), Some(&MigrationPhase::Committed));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_quiet_migration_reports_nothing() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            let reporter = RecordingReporter::new();
            let svip = svip(&backend, &reporter)?;

            svip.migrate(&3, MigrateOptions::default())?;
            assert!(reporter.events().is_empty());
            assert!(reporter.phases().is_empty());
            Ok(())
        },
        cleanup,
    )
}

// ==================== Downgrades ====================

#[test]
fn test_downgrade_round_trip() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            seed(&state(&backend)?, &sample_users())?;
            let svip = svip(&backend, &RecordingReporter::new())?;

            svip.migrate(&3, MigrateOptions::default())?;
            let result = svip.migrate(&1, MigrateOptions::default())?;

            assert_eq!(result.steps_applied(), 2);
            assert_eq!(svip.current_version()?, 1);
            let users: Vec<UserV1> = load::<UserV1>(&state(&backend)?)?
                .into_iter()
                .map(|(_, user)| user)
                .collect();
            assert_eq!(users, sample_users());

            let history: Vec<u32> = svip.version_history()?.iter().map(|r| *r.version()).collect();
            assert_eq!(history, vec![2, 3, 2, 1]);
            Ok(())
        },
        cleanup,
    )
}

// ==================== Resolution ====================

#[test]
fn test_unreachable_version_takes_no_backup() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            let svip = svip(&backend, &RecordingReporter::new())?;
            svip.migrate(&3, MigrateOptions::default())?;
            let backups = backend.backup_calls();

            let err = svip.migrate(&5, MigrateOptions::default()).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::UnreachableVersion);
            assert_eq!(backend.backup_calls(), backups);
            assert_eq!(svip.current_version()?, 3);
            assert_eq!(svip.phase(), MigrationPhase::Idle);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_plan_and_steps() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            let svip = svip(&backend, &RecordingReporter::new())?;

            assert_eq!(svip.plan(&3)?.to_string(), "1 -> 2 -> 3");
            assert_eq!(svip.latest_version(), Some(3));

            let steps: Vec<String> = svip
                .steps(Some(3), Some(1))?
                .steps()
                .iter()
                .map(|step| step.to_string())
                .collect();
            assert_eq!(steps, vec!["3 -> 2 (restoreFieldName)", "2 -> 1 (removeField)"]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_check_supported_range() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            let svip = svip(&backend, &RecordingReporter::new())?;

            assert_eq!(svip.check(1..=3)?, 1);
            let err = svip.check(2..=3).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::IncompatibleVersion);
            Ok(())
        },
        cleanup,
    )
}

// ==================== Resume ====================

#[test]
fn test_resume_after_restart() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            seed(&state(&backend)?, &sample_users())?;
            {
                let svip = svip(&backend, &RecordingReporter::new())?;
                svip.migrate(&2, MigrateOptions::default())?;
            }

            // a new orchestrator re-reads the persisted marker
            let reporter = RecordingReporter::new();
            let svip = svip(&backend, &reporter)?;
            assert_eq!(svip.current_version()?, 2);
            let result = svip.migrate(&3, MigrateOptions::new().verbose(true))?;
            assert_eq!(result.steps_applied(), 1);
            assert_eq!(reporter.completed(), vec!["renameField"]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_failing_step_leaves_earlier_steps_restored() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = FlakyBackend::new(ctx.backend());
            seed(&state(&backend)?, &sample_users())?;
            let svip = Svip::builder(backend.clone())
                .initial_version(1)
                .add_step(upgrade_steps().remove(0))
                .add_migration(2, 3, rename_field_failing)
                .build()?;

            let err = svip.migrate(&3, MigrateOptions::default()).unwrap_err();
            assert!(err.restore_ok());
            assert_eq!(svip.current_version()?, 1);
            assert_eq!(backend.restore_calls(), 1);

            let users = load::<UserV1>(&state(&backend)?)?;
            assert_eq!(users.len(), 2);
            Ok(())
        },
        cleanup,
    )
}
