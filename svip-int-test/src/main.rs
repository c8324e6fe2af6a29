use std::env;
use svip::backend::AppStateBackend;
use svip::errors::SvipResult;
use svip::Svip;
use svip_fjall_adapter::FjallBackend;
use svip_int_test::test_util::random_path;
use svip_int_test::users::{downgrade_steps, sample_users, seed, upgrade_steps};

/// Sample host application: `svip_int_test <command>` against the keyspace at
/// `SVIP_DB_PATH`, a fresh seeded one when unset.
fn main() -> SvipResult<()> {
    colog::init();

    let (path, fresh) = match env::var("SVIP_DB_PATH") {
        Ok(path) => (path, false),
        Err(_) => (random_path(), true),
    };

    let backend: FjallBackend<u32> = FjallBackend::with_config()
        .db_path(&path)
        .low_memory_preset()
        .build()?;

    let mut builder = Svip::builder(backend.clone()).initial_version(1);
    for step in upgrade_steps().into_iter().chain(downgrade_steps()) {
        builder = builder.add_step(step);
    }
    let svip = builder.build()?;

    if fresh {
        seed(&backend.state()?, &sample_users())?;
        println!("Seeded a new store at {}", path);
    }

    let code = svip.cli().prog("svip_int_test").run(env::args().skip(1));
    backend.persist()?;
    std::process::exit(code);
}
