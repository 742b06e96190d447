#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` is the command-line front-end of backhaul. One process runs one job
//! invocation described by a JSON file, which is how external schedulers
//! drive the engine:
//!
//! ```text
//! backhaul backup    --job FILE [--json] [-v...]
//! backhaul restore   --job FILE --snapshot ID --restore-path PATH
//! backhaul snapshots --job FILE
//! backhaul files     --job FILE --snapshot ID
//! ```
//!
//! # Design
//!
//! [`run`] parses the arguments with a `clap` command definition, loads the
//! invocation file, and drives the engine on a multi-threaded tokio runtime.
//! SSH credentials are resolved first: `sshKeyId` or `systemKeyId` select a
//! row of the `keyStore` file, otherwise the inline `privateKey`,
//! `privateKeyPath`, or `password` is used.
//! The transcript streams to stderr through a bounded channel while the job
//! runs; the result goes to stdout, as JSON with `--json`.
//!
//! A pull-mode backup hands its open session back to the caller. The CLI is
//! that caller, so it releases the session once the result is written.
//!
//! # Errors
//!
//! Exit status `0` means the operation succeeded, `1` that it failed
//! (including connection failures), and `2` that the arguments, the job
//! file, or its credentials were unusable.
//!
//! # Examples
//!
//! ```
//! let mut stdout = Vec::new();
//! let mut stderr = Vec::new();
//! let status = cli::run(["backhaul", "backup"], &mut stdout, &mut stderr);
//!
//! assert_eq!(status, 2);
//! assert!(String::from_utf8_lossy(&stderr).contains("--job"));
//! ```

mod error;
mod invocation;
mod keystore;
mod render;

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, builder::PathBufValueParser, error::ErrorKind};
use engine::{EngineConfig, EngineError, JobContext, JobRunner, resolve_ssh_config};
use logging::{ChannelSink, init_tracing};
use model::{BackupJobConfig, RestoreJobConfig, SshConnectionConfig};

pub use error::CliError;
pub use invocation::Invocation;

/// Program name used when the argument list is empty.
pub const PROGRAM_NAME: &str = "backhaul";

/// Exit status of a successful operation.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status of a failed operation.
pub const EXIT_FAILURE: i32 = 1;
/// Exit status of a usage or configuration error.
pub const EXIT_USAGE: i32 = 2;

/// Maximum exit code representable by a Unix process.
const MAX_EXIT_CODE: i32 = u8::MAX as i32;

/// The operation selected on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Action {
    Backup,
    Restore {
        snapshot_id: String,
        restore_path: String,
    },
    Snapshots,
    Files {
        snapshot_id: String,
    },
}

impl Action {
    const fn name(&self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Restore { .. } => "restore",
            Self::Snapshots => "snapshots",
            Self::Files { .. } => "files",
        }
    }
}

#[derive(Debug)]
struct ParsedArgs {
    action: Action,
    job_file: PathBuf,
    verbosity: u8,
    json: bool,
}

fn job_arg() -> Arg {
    Arg::new("job")
        .long("job")
        .value_name("FILE")
        .help("JSON file holding the ssh connection and the job.")
        .required(true)
        .value_parser(PathBufValueParser::new())
}

fn snapshot_arg() -> Arg {
    Arg::new("snapshot")
        .long("snapshot")
        .value_name("ID")
        .help("Snapshot identifier as listed by `snapshots`.")
        .required(true)
}

fn clap_command() -> Command {
    Command::new(PROGRAM_NAME)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs one borg, restic, or rsync job against a remote host.")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Increase diagnostic output; repeat for more.")
                .action(ArgAction::Count)
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Write the result to stdout as JSON.")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("backup")
                .about("Back up the job's sources, then apply its retention policy.")
                .arg(job_arg()),
        )
        .subcommand(
            Command::new("restore")
                .about("Restore one snapshot into a directory on the host.")
                .arg(job_arg())
                .arg(snapshot_arg())
                .arg(
                    Arg::new("restore-path")
                        .long("restore-path")
                        .value_name("PATH")
                        .help("Directory the snapshot is restored into.")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("snapshots")
                .about("List the snapshots held by the job's destination.")
                .arg(job_arg()),
        )
        .subcommand(
            Command::new("files")
                .about("List the files of one snapshot.")
                .arg(job_arg())
                .arg(snapshot_arg()),
        )
}

fn parse_args<I, S>(arguments: I) -> Result<ParsedArgs, clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut args: Vec<OsString> = arguments.into_iter().map(Into::into).collect();
    if args.is_empty() {
        args.push(OsString::from(PROGRAM_NAME));
    }

    let matches = clap_command().try_get_matches_from(args)?;
    let verbosity = matches.get_count("verbose");
    let json = matches.get_flag("json");
    let (action, sub) = match matches.subcommand() {
        Some(("backup", sub)) => (Action::Backup, sub),
        Some(("restore", sub)) => (
            Action::Restore {
                snapshot_id: required(sub, "snapshot"),
                restore_path: required(sub, "restore-path"),
            },
            sub,
        ),
        Some(("snapshots", sub)) => (Action::Snapshots, sub),
        Some(("files", sub)) => (
            Action::Files {
                snapshot_id: required(sub, "snapshot"),
            },
            sub,
        ),
        _ => {
            return Err(clap_command().error(ErrorKind::MissingSubcommand, "no operation given"));
        }
    };
    let job_file = sub.get_one::<PathBuf>("job").cloned().unwrap_or_default();

    Ok(ParsedArgs {
        action,
        job_file,
        verbosity,
        json,
    })
}

fn required(matches: &ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

/// Runs the CLI with the given arguments and output handles.
///
/// Returns the process exit status; see the crate documentation.
pub fn run<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    let parsed = match parse_args(arguments) {
        Ok(parsed) => parsed,
        Err(error) => {
            return match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    let _ = write!(stdout, "{}", error.render());
                    EXIT_SUCCESS
                }
                _ => {
                    let _ = write!(stderr, "{}", error.render());
                    EXIT_USAGE
                }
            };
        }
    };

    init_tracing(parsed.verbosity);
    let invocation = match Invocation::load(&parsed.job_file) {
        Ok(invocation) => invocation,
        Err(error) => {
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
            return EXIT_USAGE;
        }
    };
    tracing::debug!(
        target: "backhaul::cli",
        action = parsed.action.name(),
        job = %invocation.job.job_id,
        "invocation loaded"
    );

    match execute(&parsed, &invocation, stdout, stderr) {
        Ok(status) => status,
        Err(error) => {
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
            EXIT_USAGE
        }
    }
}

fn execute<Out, Err>(
    parsed: &ParsedArgs,
    invocation: &Invocation,
    stdout: &mut Out,
    stderr: &mut Err,
) -> Result<i32, CliError>
where
    Out: Write,
    Err: Write,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let config = EngineConfig::from_env();
    let runner = JobRunner::new(config);
    let resolver = keystore::resolver(invocation.key_store.clone());
    let (sink, mut receiver) = ChannelSink::bounded(config.log_queue());

    let status = runtime.block_on(async {
        let job = async {
            let mut context = JobContext::new().with_sink(sink);
            let ssh = resolve_ssh_config(
                &resolver,
                &invocation.endpoint,
                &invocation.credentials,
                invocation.system_key_id.as_deref(),
                &mut context,
            )
            .await?;
            Ok::<_, EngineError>(operate(&runner, parsed, &ssh, &invocation.job, context).await)
        };
        let transcript = async {
            while let Some(log) = receiver.recv().await {
                let _ = render::log_line(stderr, &log);
            }
        };
        let (outcome, ()) = tokio::join!(job, transcript);
        match outcome {
            Ok(outcome) => {
                let status = outcome.write(parsed.json, stdout, stderr);
                if let Outcome::Backup { lease: Some(lease), .. } = outcome {
                    lease.release().await;
                }
                status
            }
            Err(error) => {
                let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
                EXIT_USAGE
            }
        }
    });
    Ok(status)
}

enum Outcome {
    Backup {
        result: model::BackupResult,
        lease: Option<engine::SessionLease>,
    },
    Restore(model::BackupResult),
    Snapshots(engine::EngineResult<Vec<model::Snapshot>>),
    Files(engine::EngineResult<Vec<model::FileEntry>>),
}

async fn operate(
    runner: &JobRunner,
    parsed: &ParsedArgs,
    ssh: &SshConnectionConfig,
    job: &BackupJobConfig,
    context: JobContext,
) -> Outcome {
    match &parsed.action {
        Action::Backup => {
            let run = runner.run_backup_job(ssh, job, context).await;
            Outcome::Backup {
                result: run.result,
                lease: run.lease,
            }
        }
        Action::Restore {
            snapshot_id,
            restore_path,
        } => {
            let restore = RestoreJobConfig {
                job: job.clone(),
                snapshot_id: snapshot_id.clone(),
                restore_path: restore_path.clone(),
            };
            Outcome::Restore(runner.run_restore_job(ssh, &restore, context).await)
        }
        Action::Snapshots => Outcome::Snapshots(runner.list_job_snapshots(ssh, job, context).await),
        Action::Files { snapshot_id } => {
            Outcome::Files(runner.list_job_files(ssh, job, snapshot_id, context).await)
        }
    }
}

impl Outcome {
    fn write<Out: Write, Err: Write>(&self, json: bool, stdout: &mut Out, stderr: &mut Err) -> i32 {
        let written = match self {
            Self::Backup { result, .. } | Self::Restore(result) => {
                let operation = if matches!(self, Self::Backup { .. }) {
                    "backup"
                } else {
                    "restore"
                };
                let written = if json {
                    render::json(stdout, result)
                } else {
                    render::result(stdout, operation, result)
                };
                written.map(|()| result.success)
            }
            Self::Snapshots(Ok(snapshots)) => {
                let written = if json {
                    render::json(stdout, snapshots)
                } else {
                    render::snapshots(stdout, snapshots)
                };
                written.map(|()| true)
            }
            Self::Files(Ok(entries)) => {
                let written = if json {
                    render::json(stdout, entries)
                } else {
                    render::files(stdout, entries)
                };
                written.map(|()| true)
            }
            Self::Snapshots(Err(error)) | Self::Files(Err(error)) => {
                writeln!(stderr, "{PROGRAM_NAME}: {error}").map(|()| false)
            }
        };
        match written {
            Ok(true) => EXIT_SUCCESS,
            Ok(false) => EXIT_FAILURE,
            Err(error) => report_io(stderr, &error),
        }
    }
}

fn report_io<Err: Write>(stderr: &mut Err, error: &io::Error) -> i32 {
    let _ = writeln!(stderr, "{PROGRAM_NAME}: cannot write output: {error}");
    EXIT_FAILURE
}

/// Converts a numeric exit code into an [`std::process::ExitCode`].
#[must_use]
pub fn exit_code_from(status: i32) -> std::process::ExitCode {
    let clamped = status.clamp(0, MAX_EXIT_CODE);
    std::process::ExitCode::from(u8::try_from(clamped).unwrap_or(u8::MAX))
}
