use crate::command::{ExecutableCommand, ExitCode, StageInput, StageOutput};
use crate::env::Environment;
use crate::error::ShellError;
use crate::parser::Stage;
use anyhow::Result;
use nix::errno::Errno;
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use tracing::{debug, warn};

/// Command that is not a builtin, resolved to an executable path.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: PathBuf,
    name: String,
    args: Vec<OsString>,
}

impl ExternalCommand {
    /// Resolve the stage's command name against `PATH`.
    pub fn resolve(stage: &Stage) -> Result<Self, ShellError> {
        let name = stage.name()?;
        let search_paths = std::env::var_os("PATH").unwrap_or_default();
        let program = find_command_path(&search_paths, Path::new(name))
            .ok_or_else(|| ShellError::CommandNotFound(name.to_string()))?
            .into_owned();
        Ok(Self {
            program,
            name: name.to_string(),
            args: stage.args().iter().map(OsString::from).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the child without waiting for it.
    ///
    /// A refusal to create the process (EAGAIN, ENOMEM) is [`SpawnError::Fork`];
    /// any other failure to start the executable is [`SpawnError::Exec`].
    pub fn spawn(&self, stdin: StageInput, stdout: StageOutput) -> Result<Child, SpawnError> {
        let child = Command::new(&self.program)
            .arg0(&self.name)
            .args(&self.args)
            .stdin(stdin)
            .stdout(stdout)
            .spawn()
            .map_err(SpawnError::classify)?;
        debug!(pid = child.id(), command = %self.name, "spawned");
        Ok(child)
    }
}

/// Why a child could not be started.
#[derive(Debug)]
pub enum SpawnError {
    /// The OS cannot create more processes right now.
    Fork(io::Error),
    /// The executable could not be started (permissions, bad format, ...).
    Exec(io::Error),
}

impl SpawnError {
    fn classify(err: io::Error) -> Self {
        match err.raw_os_error().map(Errno::from_raw) {
            Some(Errno::EAGAIN | Errno::ENOMEM) => SpawnError::Fork(err),
            _ => SpawnError::Exec(err),
        }
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        stdin: StageInput,
        stdout: StageOutput,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let mut child = match self.spawn(stdin, stdout) {
            Ok(child) => child,
            Err(SpawnError::Fork(e)) => return Err(ShellError::Fork(e).into()),
            Err(SpawnError::Exec(e)) => {
                eprintln!("gogish: {}: {e}", self.name);
                return Ok(127);
            }
        };
        let status = child.wait()?;
        Ok(exit_code(&self.name, status))
    }
}

/// Exit code of a finished child, logged when it is not a success.
pub fn exit_code(name: &str, status: ExitStatus) -> ExitCode {
    let code = match status.code() {
        Some(code) => code,
        None => terminated_by_signal(status),
    };
    if code != 0 {
        warn!(command = name, code, "child exited with failure");
    } else {
        debug!(command = name, "child exited");
    }
    code
}

fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = exit_status.signal() {
        128 + signal
    } else if exit_status.core_dumped() {
        255
    } else {
        -1
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it exists.
/// - `./foo`: returns it if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    if path.starts_with("./") && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, None) => None,
        (Some(single), None) => find_in_path(search_paths, single.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| is_executable_file(candidate))
}

fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}
