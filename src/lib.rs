//! GoGiShell: an interactive shell with durable, ranked history.
//!
//! The shell reads keys in raw mode and edits the line itself, so the arrow
//! keys can walk through the history and TAB can complete the current input
//! to the most frequently used matching command. Submitted lines are run
//! through user-defined abbreviations, split into a pipeline and executed:
//! a small set of built-ins in-process, everything else as child processes
//! connected by pipes, with `<`, `>` and `>>` redirection.
//!
//! All state that outlives a session lives in a cache directory, see
//! [`Config`]. The main entry point is [`Interpreter`].

mod abbrev;
mod builtin;
pub mod command;
pub mod config;
pub mod editor;
pub mod env;
pub mod error;
mod external;
pub mod history;
mod interpreter;
mod labels;
pub mod parser;
pub mod terminal;

pub use config::Config;
pub use error::ShellError;
/// Just a convenient re-export of the interactive shell.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;

/// Serializes tests that change the process working directory.
#[cfg(test)]
pub(crate) fn lock_current_dir() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
