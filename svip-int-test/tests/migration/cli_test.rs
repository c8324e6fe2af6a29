use svip::errors::SvipResult;
use svip::Svip;
use svip_fjall_adapter::FjallBackend;
use svip_int_test::test_util::{cleanup, create_test_context, run_test};
use svip_int_test::users::{downgrade_steps, upgrade_steps};

fn svip(backend: FjallBackend<u32>) -> SvipResult<Svip<u32, FjallBackend<u32>>> {
    let mut builder = Svip::builder(backend).initial_version(1);
    for step in upgrade_steps().into_iter().chain(downgrade_steps()) {
        builder = builder.add_step(step);
    }
    builder.build()
}

fn run(svip: &Svip<u32, FjallBackend<u32>>, argv: &[&str]) -> (i32, String, String) {
    let (mut out, mut err) = (Vec::new(), Vec::new());
    let code = svip
        .cli()
        .prog("app")
        .run_with(argv.iter().copied(), &mut out, &mut err);
    (
        code,
        String::from_utf8(out).expect("utf-8 output"),
        String::from_utf8(err).expect("utf-8 error output"),
    )
}

#[test]
fn test_cli_migrate_and_inspect() {
    run_test(
        || create_test_context(),
        |ctx| {
            let svip = svip(ctx.backend())?;

            let (code, out, err) = run(&svip, &["migrate"]);
            assert_eq!(code, 0, "{}", err);
            assert!(out.contains("[1/2] migrating 1 -> 2 (addField)"));
            assert!(out.contains("Migrated to version 3 (2 step(s) applied)"));
            assert!(out.contains("before migration 1 -> 3"));

            let (code, out, _) = run(&svip, &["current"]);
            assert_eq!(code, 0);
            assert_eq!(out.trim(), "3");

            let (code, out, _) = run(&svip, &["history"]);
            assert_eq!(code, 0);
            let versions: Vec<&str> = out
                .lines()
                .filter_map(|line| line.split('\t').next())
                .collect();
            assert_eq!(versions, vec!["2", "3"]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_cli_steps() {
    run_test(
        || create_test_context(),
        |ctx| {
            let svip = svip(ctx.backend())?;

            let (code, out, _) = run(&svip, &["steps", "--target", "3"]);
            assert_eq!(code, 0);
            assert_eq!(out, "1 -> 2 (addField)\n2 -> 3 (renameField)\n");

            let (code, out, _) = run(&svip, &["steps", "--current", "3", "--target", "2"]);
            assert_eq!(code, 0);
            assert_eq!(out, "3 -> 2 (restoreFieldName)\n");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_cli_backup_and_info() {
    run_test(
        || create_test_context(),
        |ctx| {
            let svip = svip(ctx.backend())?;

            let (code, out, _) = run(&svip, &["backup", "--save-as", "nightly"]);
            assert_eq!(code, 0);
            assert!(out.contains("'nightly'"));
            assert!(out.contains("stored at"));

            let (code, out, _) = run(&svip, &["info"]);
            assert_eq!(code, 0);
            assert!(out.contains("backend: FjallBackend<u32>"));
            assert!(out.contains(&format!("db_path: {}", ctx.path())));
            assert!(out.contains("current_version: 1"));
            assert!(out.contains("engine: Fjall/"));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_cli_failures() {
    run_test(
        || create_test_context(),
        |ctx| {
            let svip = svip(ctx.backend())?;

            let (code, _, err) = run(&svip, &["migrate", "--target", "9"]);
            assert_eq!(code, 1);
            assert!(!err.is_empty());

            let (code, _, err) = run(&svip, &["migrate", "--target", "three"]);
            assert_eq!(code, 1);
            assert!(err.contains("Invalid version 'three'"));

            let (code, _, _) = run(&svip, &["unknown"]);
            assert_eq!(code, 2);

            let (code, out, _) = run(&svip, &["--help"]);
            assert_eq!(code, 0);
            assert!(out.contains("migrate"));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_cli_match_and_check_requirements() {
    run_test(
        || create_test_context(),
        |ctx| {
            let svip = svip(ctx.backend())?;

            let (code, out, err) = run(&svip, &["match", "--spec", "*"]);
            assert_eq!(code, 0, "{}", err);
            assert_eq!(out.trim(), "3");
            assert_eq!(run(&svip, &["match", "--spec", "<3"]).1.trim(), "2");

            let (code, out, _) = run(&svip, &["check", "--spec", "^1"]);
            assert_eq!(code, 0);
            assert_eq!(out.trim(), "Version 1 satisfies ^1");

            let (code, _, err) = run(&svip, &["check", "--spec", ">=3"]);
            assert_eq!(code, 1);
            assert!(err.starts_with("Incompatible version: "));

            let (code, _, _) = run(&svip, &["migrate", "--quiet"]);
            assert_eq!(code, 0);
            let (code, _, err) = run(&svip, &["check", "--spec", ">=3"]);
            assert_eq!(code, 0, "{}", err);
            Ok(())
        },
        cleanup,
    )
}
