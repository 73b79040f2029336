use crate::env::Environment;
use anyhow::Result;
use std::fs::File;
use std::io::{self, Write};
use std::process::{ChildStdout, Stdio};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// The shell logs exit codes but never acts on them.
pub type ExitCode = i32;

/// Where a stage reads its standard input from.
#[derive(Debug)]
pub enum StageInput {
    /// The shell's own standard input (first stage, single commands).
    Inherit,
    /// Nothing: the upstream stage redirected its output elsewhere or failed.
    Null,
    /// The read end of the previous stage's pipe.
    Pipe(ChildStdout),
    /// A file opened for `<`.
    File(File),
}

impl From<StageInput> for Stdio {
    fn from(input: StageInput) -> Self {
        match input {
            StageInput::Inherit => Stdio::inherit(),
            StageInput::Null => Stdio::null(),
            StageInput::Pipe(pipe) => pipe.into(),
            StageInput::File(file) => file.into(),
        }
    }
}

/// Where a stage writes its standard output to.
#[derive(Debug)]
pub enum StageOutput {
    /// The shell's own standard output (last stage, single commands).
    Inherit,
    /// A fresh pipe whose read end feeds the next stage.
    Piped,
    /// A file opened for `>` or `>>`.
    File(File),
}

impl StageOutput {
    /// A writer for in-process commands.
    ///
    /// Built-ins never run inside a multi-stage pipeline, so `Piped` falls
    /// back to the terminal.
    pub fn into_writer(self) -> Box<dyn Write> {
        match self {
            StageOutput::File(file) => Box::new(file),
            StageOutput::Inherit | StageOutput::Piped => Box::new(io::stdout()),
        }
    }
}

impl From<StageOutput> for Stdio {
    fn from(output: StageOutput) -> Self {
        match output {
            StageOutput::Inherit => Stdio::inherit(),
            StageOutput::Piped => Stdio::piped(),
            StageOutput::File(file) => file.into(),
        }
    }
}

/// Object-safe trait for any command a single-stage line can dispatch to.
///
/// Implemented by [`crate::builtin::Builtin`], which runs in-process, and by
/// [`crate::external::ExternalCommand`], which spawns a child and waits for it.
pub trait ExecutableCommand {
    fn execute(
        self: Box<Self>,
        stdin: StageInput,
        stdout: StageOutput,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}
