use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use nix::unistd::{AccessFlags, access};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Could not start {program}: {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} failed with {status}: {}", diagnostics(.stderr, .stdout))]
    RunError {
        program: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
}

/// fio prints some of its errors on stdout
fn diagnostics<'a>(stderr: &'a str, stdout: &'a str) -> &'a str {
    if stderr.is_empty() { stdout } else { stderr }
}

#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("error: there's no {0} installed.")]
    MissingDependency(String),
    #[error(
        "error: no access to {path}. Make sure {path} exists and you have access rights."
    )]
    NoAccess { path: String },
}

/// Resolves `program` the way a shell would, returning the executable's path
pub fn which(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }

    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}

/// Fails on the first tool that cannot be found on the search path
pub fn check_dependencies<'a>(
    tools: impl IntoIterator<Item = &'a str>,
) -> Result<(), PreconditionError> {
    for tool in tools {
        match which(tool) {
            Some(path) => debug!("Found {tool} at {}", path.display()),
            None => return Err(PreconditionError::MissingDependency(tool.to_owned())),
        }
    }
    Ok(())
}

/// The invoking user must be able to both read and write `path`
pub fn check_access(path: &Path) -> Result<(), PreconditionError> {
    access(path, AccessFlags::R_OK | AccessFlags::W_OK).map_err(|err| {
        debug!("access({}) failed: {err}", path.display());
        PreconditionError::NoAccess {
            path: path.display().to_string(),
        }
    })
}

/// Runs a program to completion and returns its stdout, failing on a non-zero exit
pub async fn simple_command_with_output<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
) -> Result<String, CommandError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| CommandError::SpawnError {
            program: program.to_owned(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(CommandError::RunError {
            program: program.to_owned(),
            status: output.status,
            stdout: stdout.trim().to_owned(),
            stderr: stderr.trim().to_owned(),
        });
    }
    if !stderr.is_empty() {
        debug!("{program} stderr: {}", stderr.trim());
    }
    Ok(stdout)
}
