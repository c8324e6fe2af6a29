//! Command surface host applications expose to operators.
//!
//! ```text
//! app migrate [--target V] [--no-save-backup] [--quiet]
//! app backup [--save-as NAME]
//! app steps [--current V] [--target V]
//! app match --spec REQ
//! app check --spec REQ
//! app current
//! app history
//! app info
//! ```
//!
//! Migrations run verbose unless `--quiet` is given. Every command exits with `0`
//! on success and `1` on failure, after printing the error chain to stderr.

use crate::backend::AppStateBackend;
use crate::errors::{ErrorKind, SvipError, SvipResult};
use crate::migration::{MigrateOptions, WriterReporter};
use crate::svip::Svip;
use crate::version::{parse_requirement, SemanticVersion};
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::fmt::Display;
use std::io::Write;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(about = "Migrate the application state between versions")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Migrate the state to a version, the latest known one by default
    Migrate {
        #[arg(long)]
        target: Option<String>,
        /// Skip the backup, a failing step can then not be undone
        #[arg(long)]
        no_save_backup: bool,
        #[arg(long)]
        quiet: bool,
    },
    /// Back up the state outside of any migration
    Backup {
        #[arg(long)]
        save_as: Option<String>,
    },
    /// List the steps between two versions
    Steps {
        #[arg(long)]
        current: Option<String>,
        #[arg(long)]
        target: Option<String>,
    },
    /// Print the highest registered version matching a requirement such as `^2`
    Match {
        #[arg(long)]
        spec: String,
    },
    /// Verify the current version satisfies a requirement
    Check {
        #[arg(long)]
        spec: String,
    },
    /// Print the version the state is at
    Current,
    /// Print the versions the state went through
    History,
    /// Print backend diagnostics
    Info,
}

/// Command line front end of a [`Svip`] orchestrator.
///
/// ```rust
/// use svip::backend::MemoryBackend;
/// use svip::Svip;
///
/// let backend: MemoryBackend<u32, Vec<String>> = MemoryBackend::new(vec![]);
/// let svip = Svip::builder(backend)
///     .add_migration(0, 1, |state| Ok(state))
///     .build()
///     .unwrap();
///
/// let (mut out, mut err) = (Vec::new(), Vec::new());
/// let code = svip.cli().run_with(["migrate"], &mut out, &mut err);
/// assert_eq!(code, 0);
/// assert!(String::from_utf8(out).unwrap().contains("now at version 1"));
/// ```
pub struct Cli<V: SemanticVersion, B: AppStateBackend<V>> {
    svip: Svip<V, B>,
    prog: String,
}

impl<V, B> Cli<V, B>
where
    V: SemanticVersion + FromStr,
    <V as FromStr>::Err: Display,
    B: AppStateBackend<V>,
{
    pub fn new(svip: Svip<V, B>) -> Self {
        Cli {
            svip,
            prog: "svip".to_string(),
        }
    }

    /// Program name shown in usage and help output.
    pub fn prog(mut self, prog: &str) -> Self {
        self.prog = prog.to_string();
        self
    }

    /// Runs the command in `argv` (program name excluded) against the process
    /// standard streams and returns the exit code.
    pub fn run<I, T>(&self, argv: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut out = std::io::stdout();
        let mut err = std::io::stderr();
        self.run_with(argv, &mut out, &mut err)
    }

    /// Same as [`Cli::run`] writing to the given streams.
    pub fn run_with<I, T>(&self, argv: I, out: &mut (dyn Write + Send), err: &mut dyn Write) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args = std::iter::once(OsString::from(&self.prog)).chain(argv.into_iter().map(Into::into));
        let parsed = match CliArgs::try_parse_from(args) {
            Ok(parsed) => parsed,
            Err(e) => {
                let rendered = e.render().to_string();
                let written = if e.use_stderr() {
                    write!(err, "{}", rendered)
                } else {
                    write!(out, "{}", rendered)
                };
                if let Err(io_error) = written {
                    log::warn!("Failed to print usage: {}", io_error);
                }
                return e.exit_code();
            }
        };

        match self.execute(parsed.command, out) {
            Ok(()) => 0,
            Err(e) => {
                if let Err(io_error) = writeln!(err, "{}", e.chain()) {
                    log::warn!("Failed to print error: {}", io_error);
                }
                1
            }
        }
    }

    fn execute(&self, command: Command, out: &mut (dyn Write + Send)) -> SvipResult<()> {
        match command {
            Command::Migrate {
                target,
                no_save_backup,
                quiet,
            } => self.migrate(target.as_deref(), !no_save_backup, !quiet, out),
            Command::Backup { save_as } => {
                let handle = self.svip.backup(save_as.as_deref())?;
                writeln!(out, "{}", handle.info())?;
                Ok(())
            }
            Command::Steps { current, target } => {
                let current = current.as_deref().map(parse_version::<V>).transpose()?;
                let target = target.as_deref().map(parse_version::<V>).transpose()?;
                let plan = self.svip.steps(current, target)?;
                for step in plan.steps() {
                    writeln!(out, "{}", step)?;
                }
                Ok(())
            }
            Command::Match { spec } => {
                let requirement = parse_requirement(&spec)?;
                writeln!(out, "{}", self.svip.latest_match(&requirement)?)?;
                Ok(())
            }
            Command::Check { spec } => {
                let requirement = parse_requirement(&spec)?;
                let current = self.svip.check_requirement(&requirement)?;
                writeln!(out, "Version {} satisfies {}", current, requirement)?;
                Ok(())
            }
            Command::Current => {
                writeln!(out, "{}", self.svip.current_version()?)?;
                Ok(())
            }
            Command::History => {
                for record in self.svip.version_history()? {
                    writeln!(out, "{}\t{}", record.version(), record.recorded_at().to_rfc3339())?;
                }
                Ok(())
            }
            Command::Info => {
                for (name, value) in self.svip.info()? {
                    writeln!(out, "{}: {}", name, value)?;
                }
                Ok(())
            }
        }
    }

    fn migrate(
        &self,
        target: Option<&str>,
        save_backup: bool,
        verbose: bool,
        out: &mut (dyn Write + Send),
    ) -> SvipResult<()> {
        let target = match target {
            Some(target) => parse_version::<V>(target)?,
            None => match self.svip.latest_version() {
                Some(latest) => latest,
                None => self.svip.current_version()?,
            },
        };
        let options = MigrateOptions::new().verbose(verbose).save_backup(save_backup);

        let result = {
            let reporter = WriterReporter::new(&mut *out);
            self.svip.migrate_with(&target, options, &reporter)?
        };

        writeln!(
            out,
            "Migrated to version {} ({} step(s) applied)",
            result.final_version(),
            result.steps_applied()
        )?;
        if let Some(handle) = result.backup() {
            writeln!(out, "Backup: {}", handle.info())?;
        }
        Ok(())
    }
}

impl<V, B> Svip<V, B>
where
    V: SemanticVersion + FromStr,
    <V as FromStr>::Err: Display,
    B: AppStateBackend<V>,
{
    /// Command line front end sharing this orchestrator.
    pub fn cli(&self) -> Cli<V, B> {
        Cli::new(self.clone())
    }
}

fn parse_version<V>(value: &str) -> SvipResult<V>
where
    V: FromStr,
    <V as FromStr>::Err: Display,
{
    V::from_str(value).map_err(|e| {
        log::error!("Invalid version '{}': {}", value, e);
        SvipError::new(&format!("Invalid version '{}': {}", value, e), ErrorKind::ValidationError)
    })
}
