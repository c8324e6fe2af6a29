use std::path::Path;
use svip::backend::AppStateBackend;
use svip::migration::MigrateOptions;
use svip::Svip;
use svip_fjall_adapter::FjallBackend;
use svip_int_test::test_util::{cleanup, create_test_context, random_path, run_test};
use svip_int_test::users::{load, sample_users, seed, upgrade_steps, UserV2};

#[test]
fn test_state_and_version_survive_reopen() {
    let path = random_path();
    {
        let backend: FjallBackend<u32> = FjallBackend::with_config().db_path(&path).build().unwrap();
        seed(&backend.state().unwrap(), &sample_users()).unwrap();
        let svip = Svip::builder(backend.clone())
            .initial_version(1)
            .add_step(upgrade_steps().remove(0))
            .build()
            .unwrap();
        svip.migrate(&2, MigrateOptions::default()).unwrap();
        backend.persist().unwrap();
    }

    let backend: FjallBackend<u32> = FjallBackend::with_config().db_path(&path).build().unwrap();
    assert_eq!(backend.current_version().unwrap(), Some(2));
    let users = load::<UserV2>(&backend.state().unwrap()).unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].1.name, "Bob");

    let backups_dir = backend.config().backups_dir();
    drop(backend);
    let _ = std::fs::remove_dir_all(&path);
    let _ = std::fs::remove_dir_all(backups_dir);
}

#[test]
fn test_migration_backups_are_pruned() {
    run_test(
        || create_test_context(),
        |ctx| {
            let backend = ctx.backend();
            let svip = Svip::builder(backend.clone())
                .add_migration(0, 1, |state| Ok(state))
                .add_migration(1, 2, |state| Ok(state))
                .add_migration(2, 3, |state| Ok(state))
                .add_migration(3, 4, |state| Ok(state))
                .build()?;

            let mut locations = Vec::new();
            for target in 1..=4 {
                let result = svip.migrate(&target, MigrateOptions::default())?;
                let handle = result.backup().expect("backup taken");
                locations.push(handle.location().expect("backup location").to_string());
            }

            // created with max_backups(3)
            assert_eq!(backend.backup_locations()?.len(), 3);
            assert!(!Path::new(&locations[0]).exists());
            assert!(Path::new(&locations[3]).exists());
            Ok(())
        },
        cleanup,
    )
}
