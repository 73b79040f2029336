use crate::abbrev::SetOutcome;
use crate::command::{ExecutableCommand, ExitCode, StageInput, StageOutput};
use crate::env::Environment;
use crate::labels::LabelColor;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "history" or "cd".
    fn name() -> &'static str;

    /// Usage text printed when the arguments don't fit.
    fn usage() -> &'static str;

    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;

    /// `None` unless `name` is this command; argument errors become [`Builtin::Invalid`].
    ///
    /// Builtins take positionals only, so everything but a lone `--help` is
    /// passed after `--` and words like `-la` stay arguments.
    fn try_parse(name: &str, args: &[&str], wrap: fn(Self) -> Builtin) -> Option<Builtin> {
        if name != Self::name() {
            return None;
        }
        let args: Vec<&str> = match args {
            ["--help"] => args.to_vec(),
            _ => std::iter::once("--").chain(args.iter().copied()).collect(),
        };
        Some(match Self::from_args(&[name], &args) {
            Ok(cmd) => wrap(cmd),
            Err(EarlyExit { output, status }) => Builtin::Invalid(InvalidArgs {
                output,
                usage: Self::usage(),
                is_error: status.is_err(),
            }),
        })
    }
}

/// A parsed built-in invocation, dispatched with a single match.
pub enum Builtin {
    Cd(Cd),
    SetHome(SetHome),
    History(History),
    Home(Home),
    SetAbbr(SetAbbr),
    Abbr(Abbr),
    Ldir(Ldir),
    Help(Help),
    Invalid(InvalidArgs),
}

impl Builtin {
    /// Recognize `argv` as a built-in. `None` means "not a built-in".
    pub fn parse(argv: &[String]) -> Option<Builtin> {
        let (name, args) = argv.split_first()?;
        let name = name.as_str();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        Cd::try_parse(name, &args, Builtin::Cd)
            .or_else(|| SetHome::try_parse(name, &args, Builtin::SetHome))
            .or_else(|| History::try_parse(name, &args, Builtin::History))
            .or_else(|| Home::try_parse(name, &args, Builtin::Home))
            .or_else(|| SetAbbr::try_parse(name, &args, Builtin::SetAbbr))
            .or_else(|| Abbr::try_parse(name, &args, Builtin::Abbr))
            .or_else(|| Ldir::try_parse(name, &args, Builtin::Ldir))
            .or_else(|| Help::try_parse(name, &args, Builtin::Help))
    }

    pub fn run(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        match self {
            Builtin::Cd(cmd) => cmd.execute(stdout, env),
            Builtin::SetHome(cmd) => cmd.execute(stdout, env),
            Builtin::History(cmd) => cmd.execute(stdout, env),
            Builtin::Home(cmd) => cmd.execute(stdout, env),
            Builtin::SetAbbr(cmd) => cmd.execute(stdout, env),
            Builtin::Abbr(cmd) => cmd.execute(stdout, env),
            Builtin::Ldir(cmd) => cmd.execute(stdout, env),
            Builtin::Help(cmd) => cmd.execute(stdout, env),
            Builtin::Invalid(invalid) => invalid.report(stdout),
        }
    }
}

impl ExecutableCommand for Builtin {
    fn execute(
        self: Box<Self>,
        _stdin: StageInput,
        stdout: StageOutput,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let mut out = stdout.into_writer();
        let code = self.run(&mut *out, env)?;
        out.flush()?;
        Ok(code)
    }
}

/// Arguments argh refused (or `--help`).
pub struct InvalidArgs {
    output: String,
    usage: &'static str,
    is_error: bool,
}

impl InvalidArgs {
    fn report(self, stdout: &mut dyn Write) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.output.trim_end())?;
        if self.is_error {
            writeln!(stdout, "{}", self.usage)?;
            return Ok(1);
        }
        Ok(0)
    }
}

fn current_dir() -> Result<PathBuf> {
    env::current_dir().context("failed to read current directory")
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the shell's home directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn usage() -> &'static str {
        "Usage: cd <path>\n\tcd"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => env.home_dir().to_path_buf(),
        };

        if let Ok(canonical) = fs::canonicalize(&target) {
            if let Some(description) = env.labels.description_for(&canonical)? {
                writeln!(stdout, "{description}")?;
            }
        }

        env::set_current_dir(&target)
            .with_context(|| format!("cd: can't chdir to {}", target.display()))?;
        env.mark_cwd_changed();
        debug!(cwd = %target.display(), "working directory changed");
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the shell's home directory.
pub struct SetHome {
    #[argh(positional)]
    /// a path, or one of '.', '..', '~', 'default'.
    pub path: String,
}

impl BuiltinCommand for SetHome {
    fn name() -> &'static str {
        "sethome"
    }

    fn usage() -> &'static str {
        "Usage: sethome <path>\n\tsethome .\n\tsethome ..\n\tsethome default"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let home = match self.path.as_str() {
            "~" => return Ok(0),
            "." => current_dir()?,
            ".." => {
                let cwd = current_dir()?;
                cwd.parent().map(Path::to_path_buf).unwrap_or(cwd)
            }
            "default" => env.system_home().to_path_buf(),
            path => match fs::canonicalize(path) {
                Ok(resolved) => resolved,
                Err(e) => {
                    debug!("sethome: can't resolve {path}: {e}");
                    writeln!(stdout, "{}", Self::usage())?;
                    return Ok(1);
                }
            },
        };

        env.set_home_dir(home.clone())?;
        writeln!(stdout, "Home directory is recorded and set as: {}", home.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print or clear the command history.
pub struct History {
    #[argh(positional)]
    /// how many of the latest entries to print, or 'clear'.
    pub arg: Option<String>,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn usage() -> &'static str {
        "Usage: history <number_of_lines>\n\thistory clear\n\thistory"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let count = match self.arg.as_deref() {
            None => None,
            Some("clear") => {
                env.history.clear()?;
                writeln!(stdout, "History was successfully cleared.")?;
                return Ok(0);
            }
            Some(n) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    writeln!(stdout, "{}", Self::usage())?;
                    return Ok(1);
                }
            },
        };

        let entries = env.history.entries()?;
        let start = count.map_or(0, |n| entries.len().saturating_sub(n));
        for (index, line) in entries.iter().enumerate().skip(start) {
            writeln!(stdout, "{} {}", index + 1, line)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the shell's home directory.
pub struct Home {}

impl BuiltinCommand for Home {
    fn name() -> &'static str {
        "home"
    }

    fn usage() -> &'static str {
        "Usage: home"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "Current home directory is: {}", env.home_dir().display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Define an abbreviation, or clear them all.
pub struct SetAbbr {
    #[argh(positional, greedy)]
    /// the value words followed by the key, or 'clear'.
    pub words: Vec<String>,
}

impl BuiltinCommand for SetAbbr {
    fn name() -> &'static str {
        "setabbr"
    }

    fn usage() -> &'static str {
        "Usage: setabbr <value> <key>\n\tsetabbr clear"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        if self.words.len() == 1 && self.words[0] == "clear" {
            env.abbreviations.clear(&env.home_dir().to_string_lossy())?;
            writeln!(stdout, "Abbreviations were successfully cleared.")?;
            return Ok(0);
        }

        let Some((key, value_words)) = self.words.split_last().filter(|(_, v)| !v.is_empty())
        else {
            writeln!(stdout, "{}", Self::usage())?;
            return Ok(1);
        };
        let value = value_words.join(" ");

        if key.contains(':') || value.contains(':') {
            writeln!(stdout, "':' is not allowed in value or key.")?;
            return Ok(1);
        }

        match env.abbreviations.set(&value, key)? {
            SetOutcome::Added => writeln!(stdout, "Abbreviation '{value}' as '{key}' added.")?,
            SetOutcome::Updated => {
                writeln!(stdout, "Abbreviation for '{key}' updated to '{value}'.")?
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print every abbreviation as key:value.
pub struct Abbr {}

impl BuiltinCommand for Abbr {
    fn name() -> &'static str {
        "abbr"
    }

    fn usage() -> &'static str {
        "Usage: abbr"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        for entry in env.abbreviations.entries()? {
            writeln!(stdout, "{}:{}", entry.key, entry.value)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Label a directory with a prompt color and a description.
pub struct Ldir {
    #[argh(positional)]
    /// directory to label.
    pub path: String,

    #[argh(positional)]
    /// one of black, red, green, yellow, blue, magenta, cyan, white.
    pub color: String,

    #[argh(positional, greedy)]
    /// text printed when entering the directory with cd.
    pub description: Vec<String>,
}

impl BuiltinCommand for Ldir {
    fn name() -> &'static str {
        "ldir"
    }

    fn usage() -> &'static str {
        "Usage: ldir <path> <color> [description]"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let Some(color) = LabelColor::from_name(&self.color) else {
            writeln!(
                stdout,
                "Unknown color '{}', expected one of: {}",
                self.color,
                LabelColor::NAMES.join(", ")
            )?;
            writeln!(stdout, "{}", Self::usage())?;
            return Ok(1);
        };
        let dir = fs::canonicalize(&self.path)
            .with_context(|| format!("ldir: can't resolve {}", self.path))?;

        env.labels.set(&dir, color, &self.description.join(" "))?;
        env.mark_cwd_changed();
        writeln!(stdout, "Directory '{}' labeled {}.", dir.display(), self.color)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the manual.
pub struct Help {}

const MANUAL: &str = "
GoGiShell passes your commands to the system and adds a few of its own.
Pipelines (a | b) and redirections (<, >, >>) work for external programs.

cd [path] - change directory; without a path, go to the home directory

sethome <path> - change the home directory:
        <path> - any existing directory
        . - the current directory
        .. - the parent of the current directory
        default - the home directory reported by the system

home - print the home directory

setabbr <value> <key> - expand <key> into <value> in every line you type, or
        setabbr clear - forget every abbreviation

abbr - print every key:value abbreviation

ldir <path> <color> [description] - color the prompt inside <path> and
        print the description when entering it

history - print the whole history, or:
        clear - clear the history
        <number> - print the last <number> commands

help - print this manual

UP and DOWN arrows walk through the history.
TAB completes the current input to the most used matching command.
";

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn usage() -> &'static str {
        "Usage: help"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{MANUAL}")?;
        Ok(0)
    }
}
