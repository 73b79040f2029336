use crate::abbrev::Expanded;
use crate::builtin::Builtin;
use crate::command::{ExecutableCommand, StageInput, StageOutput};
use crate::config::{Config, PipelineMode};
use crate::editor::{LineEditor, ReadOutcome};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::{self, ExternalCommand, SpawnError};
use crate::parser::{Pipeline, Redirect, RedirectKind, Stage, parse_pipeline};
use crate::terminal::{KeyReader, RawModeGuard};
use anyhow::Result;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::process::Child;
use tracing::{debug, warn};

/// The interactive shell: reads lines, expands them and runs them.
///
/// Example
/// ```no_run
/// use gogish::{Config, Interpreter};
/// let mut sh = Interpreter::new(Config::from_env()?)?;
/// sh.repl()?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct Interpreter {
    pipeline_mode: PipelineMode,
    env: Environment,
    editor: LineEditor,
    prompt: String,
}

impl Interpreter {
    pub fn new(config: Config) -> Result<Self> {
        let env = Environment::open(&config)?;
        Ok(Self {
            pipeline_mode: config.pipeline_mode,
            editor: LineEditor::new(config.max_input_len),
            env,
            prompt: String::new(),
        })
    }

    /// Read-eval loop until `exit` or end of input.
    ///
    /// Only a failure to create child processes ends the loop with an error.
    pub fn repl(&mut self) -> Result<()> {
        let guard = RawModeGuard::enable()?;
        let stdin = io::stdin();
        let mut keys = KeyReader::new(stdin.lock());
        let mut stdout = io::stdout();

        loop {
            self.refresh_prompt();
            let outcome =
                self.editor
                    .read_line(&self.prompt, &mut keys, &mut stdout, &self.env.history)?;
            let line = match outcome {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Eof => {
                    println!();
                    break;
                }
            };
            if line.is_empty() {
                continue;
            }
            if line == "exit" {
                break;
            }

            match guard.suspended(|| self.process_line(&line))? {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => eprintln!("gogish: {e:#}"),
            }
        }
        Ok(())
    }

    /// Record, expand, parse and run one submitted line.
    pub fn process_line(&mut self, line: &str) -> Result<(), ShellError> {
        if let Err(e) = self.env.history.record(line) {
            eprintln!("gogish: {e:#}");
        }

        let expanded = self
            .env
            .abbreviations
            .expand(line, self.env.max_input_len())
            .unwrap_or_else(|e| {
                eprintln!("gogish: {e:#}");
                Expanded {
                    line: line.to_string(),
                    truncated: false,
                }
            });
        if expanded.truncated {
            eprintln!("gogish: expanded line exceeds maximum input length, truncated");
        }

        let pipeline = parse_pipeline(&expanded.line);
        debug!(stages = pipeline.len(), line = %expanded.line, "executing");
        if pipeline.is_single() {
            self.execute_single(&pipeline.stages()[0])
        } else {
            self.execute_pipeline(&pipeline)
        }
    }

    fn execute_single(&mut self, stage: &Stage) -> Result<(), ShellError> {
        stage.name()?;
        let command: Box<dyn ExecutableCommand> = match Builtin::parse(&stage.argv) {
            Some(builtin) => Box::new(builtin),
            None => Box::new(ExternalCommand::resolve(stage)?),
        };

        let opened = open_redirects(std::slice::from_ref(stage))?.pop().flatten();
        let (stdin, stdout) = match opened {
            None => (StageInput::Inherit, StageOutput::Inherit),
            Some(OpenedRedirect::Input(file)) => (StageInput::File(file), StageOutput::Inherit),
            Some(OpenedRedirect::Output(file)) => (StageInput::Inherit, StageOutput::File(file)),
        };

        let code = command
            .execute(stdin, stdout, &mut self.env)
            .map_err(classify)?;
        debug!(code, "command finished");
        Ok(())
    }

    fn execute_pipeline(&self, pipeline: &Pipeline) -> Result<(), ShellError> {
        let commands = pipeline
            .stages()
            .iter()
            .map(|stage| -> Result<ExternalCommand, ShellError> {
                stage.name()?;
                if let Some(redirect) = &stage.redirect {
                    redirect.target()?;
                }
                ExternalCommand::resolve(stage)
            })
            .collect::<Result<Vec<_>, ShellError>>()?;

        let redirects = open_redirects(pipeline.stages())?;

        let last = commands.len() - 1;
        let mut previous = StageInput::Inherit;
        let mut running: Vec<(&str, Child)> = Vec::new();

        for (index, (command, redirect)) in commands.iter().zip(redirects).enumerate() {
            let piped_in = std::mem::replace(&mut previous, StageInput::Null);
            let default_out = if index == last {
                StageOutput::Inherit
            } else {
                StageOutput::Piped
            };
            let (stdin, stdout) = match redirect {
                None => (piped_in, default_out),
                Some(OpenedRedirect::Input(file)) => (StageInput::File(file), default_out),
                Some(OpenedRedirect::Output(file)) => (piped_in, StageOutput::File(file)),
            };

            let mut child = match command.spawn(stdin, stdout) {
                Ok(child) => child,
                Err(SpawnError::Fork(e)) => {
                    for (name, child) in running {
                        wait_child(name, child);
                    }
                    return Err(ShellError::Fork(e));
                }
                Err(SpawnError::Exec(e)) => {
                    eprintln!("gogish: {}: {e}", command.name());
                    continue;
                }
            };
            if let Some(out) = child.stdout.take() {
                previous = StageInput::Pipe(out);
            }

            match self.pipeline_mode {
                PipelineMode::Sequential => wait_child(command.name(), child),
                PipelineMode::Concurrent => running.push((command.name(), child)),
            }
        }

        for (name, child) in running {
            wait_child(name, child);
        }
        Ok(())
    }

    fn refresh_prompt(&mut self) {
        if !self.env.take_cwd_changed() {
            return;
        }
        let cwd = match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(e) => {
                eprintln!("gogish: failed to read current directory: {e}");
                return;
            }
        };
        let color = self.env.labels.color_for(&cwd).unwrap_or_else(|e| {
            warn!("failed to read directory labels: {e:#}");
            None
        });
        self.prompt = render_prompt(&cwd, self.env.home_dir(), color);
    }
}

/// A redirection target opened for its stage.
enum OpenedRedirect {
    Input(File),
    Output(File),
}

/// Open every stage's redirection target, one slot per stage.
///
/// Inputs are opened first and outputs are only truncated once every target
/// is open, so a failing target leaves existing files untouched.
fn open_redirects(stages: &[Stage]) -> Result<Vec<Option<OpenedRedirect>>, ShellError> {
    let mut order: Vec<(usize, &Redirect)> = stages
        .iter()
        .enumerate()
        .filter_map(|(index, stage)| stage.redirect.as_ref().map(|r| (index, r)))
        .collect();
    order.sort_by_key(|(_, redirect)| redirect.kind != RedirectKind::Input);

    let mut opened: Vec<Option<OpenedRedirect>> = stages.iter().map(|_| None).collect();
    for (index, redirect) in order {
        opened[index] = Some(open_redirect(redirect)?);
    }

    for (stage, slot) in stages.iter().zip(&opened) {
        if let (Some(redirect), Some(OpenedRedirect::Output(file))) = (&stage.redirect, slot) {
            if redirect.kind == RedirectKind::Output {
                file.set_len(0)
                    .map_err(|source| redirect_error(redirect, source))?;
            }
        }
    }
    Ok(opened)
}

/// Open one target. `>` targets are created but not yet truncated.
fn open_redirect(redirect: &Redirect) -> Result<OpenedRedirect, ShellError> {
    let path = redirect.target()?;
    let opened = match redirect.kind {
        RedirectKind::Input => File::open(path).map(OpenedRedirect::Input),
        RedirectKind::Output => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(path)
            .map(OpenedRedirect::Output),
        RedirectKind::Append => OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o644)
            .open(path)
            .map(OpenedRedirect::Output),
    };
    opened.map_err(|source| redirect_error(redirect, source))
}

fn redirect_error(redirect: &Redirect, source: io::Error) -> ShellError {
    ShellError::Redirect {
        path: redirect.target.clone().unwrap_or_default().into(),
        kind: redirect.kind,
        source,
    }
}

fn wait_child(name: &str, mut child: Child) {
    match child.wait() {
        Ok(status) => {
            external::exit_code(name, status);
        }
        Err(e) => warn!(command = name, "wait failed: {e}"),
    }
}

/// Keep typed errors (a fork failure must stay fatal); anything else is a resource error.
fn classify(err: anyhow::Error) -> ShellError {
    err.downcast::<ShellError>()
        .unwrap_or_else(ShellError::Resource)
}

/// `cwd` with a leading `home` replaced by `~`, compared component-wise.
pub fn display_cwd(cwd: &Path, home: &Path) -> String {
    match cwd.strip_prefix(home) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => cwd.display().to_string(),
    }
}

fn render_prompt(cwd: &Path, home: &Path, color: Option<u8>) -> String {
    let shown = display_cwd(cwd, home);
    let shown = match color {
        Some(code) => format!("\x1b[{code}m{shown}\x1b[0m"),
        None => shown,
    };
    format!("\x1b[1;34mGoGiShell:\x1b[37m{shown}$ ")
}
