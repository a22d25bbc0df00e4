//! Terminal process actions: replacing the current process with a shell, or
//! running a command to completion.

use std::convert::Infallible;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::debug;

use crate::injector::EnvList;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("no command given")]
    EmptyCommand,

    #[error("spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("exec {program}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Replace the current process with `program`, started as `argv0`.
///
/// Variables already set in the current process are inherited and `env` is
/// applied on top. This only returns on failure.
#[cfg(unix)]
pub fn replace_with(program: &Path, argv0: &str, env: &EnvList) -> Result<Infallible, ProcessError> {
    use std::os::unix::process::CommandExt;

    debug!(program = %program.display(), vars = env.len(), "Replacing process");
    let source = Command::new(program).arg0(argv0).envs(env.iter()).exec();
    Err(ProcessError::Exec {
        program: program.display().to_string(),
        source,
    })
}

/// Run `program` as a child, then exit with its exit code.
///
/// Stands in for process replacement where `exec` is unavailable.
#[cfg(not(unix))]
pub fn replace_with(program: &Path, _argv0: &str, env: &EnvList) -> Result<Infallible, ProcessError> {
    let mut command = Command::new(program);
    command.envs(env.iter());
    debug!(program = %program.display(), vars = env.len(), "Running shell as child");

    let status = wait_ignoring_interrupts(&mut command, &program.display().to_string())?;
    std::process::exit(exit_code(status))
}

/// Run `argv` with `env` layered over the inherited environment and wait for it.
///
/// Standard streams are inherited. Ctrl+C is left to the child: the parent
/// ignores it while waiting so the child decides how to shut down.
pub fn run_child(argv: &[String], env: &EnvList) -> Result<ExitStatus, ProcessError> {
    let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;

    let mut command = Command::new(program);
    command.args(args).envs(env.iter());
    debug!(program = %program, vars = env.len(), "Running child process");

    wait_ignoring_interrupts(&mut command, program)
}

fn wait_ignoring_interrupts(command: &mut Command, program: &str) -> Result<ExitStatus, ProcessError> {
    // The handler can only be installed once per process; a second call
    // reports MultipleHandlers while the first handler stays active.
    if let Err(e) = ctrlc::set_handler(|| {}) {
        debug!(error = %e, "Ctrl+C handler not installed");
    }

    command.status().map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })
}

/// Exit code mirroring `status`: the child's own code, or 128 plus the signal
/// number when it was killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
