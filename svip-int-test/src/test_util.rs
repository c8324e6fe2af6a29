use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::{env, fs, thread};
use svip::backend::{
    AppStateBackend, BackendAttributes, BackupHandle, Inconsistency, StateTransaction, VersionRecord,
};
use svip::errors::{ErrorKind, SvipError, SvipResult};
use svip::migration::{MigrationInfo, MigrationPhase, ProgressEvent, ProgressReporter, StepStatus};
use svip::Version;
use svip_fjall_adapter::FjallBackend;

/// Runs a test between a setup and a teardown, the teardown running even when the
/// test panics.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: FnOnce(TestContext) -> SvipResult<()>,
    B: FnOnce() -> SvipResult<TestContext>,
    A: FnOnce(TestContext) -> SvipResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {}", e.chain()),
    };

    let test_ctx = ctx.clone();
    let result = std::panic::catch_unwind(AssertUnwindSafe(move || test(test_ctx)));
    if let Err(e) = after(ctx) {
        eprintln!("Warning: After run failed: {}", e.chain());
    }

    match result {
        Ok(Ok(())) => (),
        Ok(Err(e)) => panic!("Test failed: {}", e.chain()),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[derive(Clone)]
pub struct TestContext {
    path: String,
    backend: FjallBackend<u32>,
}

impl TestContext {
    pub fn new(path: String, backend: FjallBackend<u32>) -> Self {
        Self { path, backend }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn backend(&self) -> FjallBackend<u32> {
        self.backend.clone()
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    env::temp_dir().join(id.to_string()).to_string_lossy().to_string()
}

/// Opens a Fjall backend in a fresh temporary directory.
pub fn create_test_context() -> SvipResult<TestContext> {
    let path = random_path();
    // one flush and one compaction worker per keyspace
    let backend = FjallBackend::with_config()
        .db_path(&path)
        .low_memory_preset()
        .max_backups(3)
        .build()?;
    Ok(TestContext::new(path, backend))
}

/// Removes the keyspace and its backups.
pub fn cleanup(ctx: TestContext) -> SvipResult<()> {
    let backups_dir = ctx.backend.config().backups_dir();
    let path = ctx.path().to_string();
    if let Err(e) = ctx.backend.persist() {
        eprintln!("Warning: Failed to persist keyspace: {}", e.chain());
    }
    drop(ctx);

    // give the keyspace time to release file handles
    thread::sleep(Duration::from_millis(50));
    remove_dir(Path::new(&path));
    remove_dir(&backups_dir);
    Ok(())
}

fn remove_dir(path: &Path) {
    const MAX_RETRIES: u32 = 10;
    let mut delay_ms = 50u64;

    for retry in 0..MAX_RETRIES {
        if !path.exists() {
            return;
        }
        match fs::remove_dir_all(path) {
            Ok(_) => return,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) if retry == MAX_RETRIES - 1 => {
                eprintln!(
                    "Warning: Failed to remove test directory {} after {} attempts: {:?}",
                    path.display(),
                    MAX_RETRIES,
                    e
                );
            }
            Err(_) => {
                thread::sleep(Duration::from_millis(delay_ms));
                delay_ms = std::cmp::min(delay_ms * 2, 1000);
            }
        }
    }
}

/// Reporter keeping every event and phase it receives.
pub struct RecordingReporter<V: Version> {
    events: Arc<Mutex<Vec<ProgressEvent<V>>>>,
    phases: Arc<Mutex<Vec<MigrationPhase>>>,
}

impl<V: Version> RecordingReporter<V> {
    pub fn new() -> Self {
        RecordingReporter {
            events: Arc::new(Mutex::new(Vec::new())),
            phases: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent<V>> {
        self.events.lock().clone()
    }

    /// Names of the completed steps, in order.
    pub fn completed(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.status == StepStatus::Completed)
            .map(|event| {
                event
                    .step_name
                    .clone()
                    .unwrap_or_else(|| format!("{} -> {}", event.source_version, event.target_version))
            })
            .collect()
    }

    pub fn phases(&self) -> Vec<MigrationPhase> {
        self.phases.lock().clone()
    }
}

impl<V: Version> Clone for RecordingReporter<V> {
    fn clone(&self) -> Self {
        RecordingReporter {
            events: self.events.clone(),
            phases: self.phases.clone(),
        }
    }
}

impl<V: Version> Default for RecordingReporter<V> {
    fn default() -> Self {
        RecordingReporter::new()
    }
}

impl<V: Version> ProgressReporter<V> for RecordingReporter<V> {
    fn on_step(&self, event: &ProgressEvent<V>) -> SvipResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn on_phase(&self, phase: &MigrationPhase) -> SvipResult<()> {
        self.phases.lock().push(*phase);
        Ok(())
    }
}

#[derive(Default)]
struct FlakyState {
    backups: AtomicUsize,
    restores: AtomicUsize,
    fail_backup: AtomicBool,
    fail_restore: AtomicBool,
}

/// Backend wrapper counting backup and restore calls, able to fail either.
pub struct FlakyBackend<B> {
    inner: B,
    state: Arc<FlakyState>,
}

impl<B> FlakyBackend<B> {
    pub fn new(inner: B) -> Self {
        FlakyBackend {
            inner,
            state: Arc::new(FlakyState::default()),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn backup_calls(&self) -> usize {
        self.state.backups.load(Ordering::SeqCst)
    }

    pub fn restore_calls(&self) -> usize {
        self.state.restores.load(Ordering::SeqCst)
    }

    pub fn fail_backup(&self, fail: bool) {
        self.state.fail_backup.store(fail, Ordering::SeqCst);
    }

    pub fn fail_restore(&self, fail: bool) {
        self.state.fail_restore.store(fail, Ordering::SeqCst);
    }
}

impl<B: Clone> Clone for FlakyBackend<B> {
    fn clone(&self) -> Self {
        FlakyBackend {
            inner: self.inner.clone(),
            state: self.state.clone(),
        }
    }
}

impl<B: BackendAttributes> BackendAttributes for FlakyBackend<B> {
    fn attributes(&self) -> Vec<(String, String)> {
        self.inner.attributes()
    }
}

impl<V: Version, B: AppStateBackend<V>> AppStateBackend<V> for FlakyBackend<B> {
    type State = B::State;

    fn state(&self) -> SvipResult<Self::State> {
        self.inner.state()
    }

    fn supports_backup(&self) -> bool {
        self.inner.supports_backup()
    }

    fn backup(&self, migration_info: Option<&MigrationInfo<V>>) -> SvipResult<BackupHandle> {
        self.state.backups.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_backup.load(Ordering::SeqCst) {
            return Err(SvipError::new("disk full", ErrorKind::IOError));
        }
        self.inner.backup(migration_info)
    }

    fn restore(&self, handle: &BackupHandle) -> SvipResult<()> {
        self.state.restores.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_restore.load(Ordering::SeqCst) {
            return Err(SvipError::new("backup artifact corrupt", ErrorKind::RestoreFailed));
        }
        self.inner.restore(handle)
    }

    fn supports_transaction(&self) -> bool {
        self.inner.supports_transaction()
    }

    fn begin_transaction(&self) -> SvipResult<Box<dyn StateTransaction + '_>> {
        self.inner.begin_transaction()
    }

    fn current_version(&self) -> SvipResult<Option<V>> {
        self.inner.current_version()
    }

    fn set_version(&self, version: &V) -> SvipResult<()> {
        self.inner.set_version(version)
    }

    fn version_history(&self) -> SvipResult<Vec<VersionRecord<V>>> {
        self.inner.version_history()
    }

    fn register_inconsistency(&self, inconsistency: &Inconsistency) -> SvipResult<()> {
        self.inner.register_inconsistency(inconsistency)
    }

    fn inconsistency(&self) -> SvipResult<Option<Inconsistency>> {
        self.inner.inconsistency()
    }

    fn clear_inconsistency(&self) -> SvipResult<()> {
        self.inner.clear_inconsistency()
    }
}
