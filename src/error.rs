use crate::parser::RedirectKind;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can abandon a command line once it has been submitted.
#[derive(Debug, Error)]
pub enum ShellError {
    /// A pipeline stage had no tokens at all (`ls |`, `| wc`, an empty line).
    #[error("no command provided")]
    NoCommand,

    /// A redirection operator was the last token of its stage.
    #[error("missing file name after '{}'", .0.operator())]
    MissingRedirectTarget(RedirectKind),

    /// The command is neither a built-in nor an executable on `PATH`.
    #[error("{0}: no such internal or GoGiShell command")]
    CommandNotFound(String),

    /// A redirection target could not be opened.
    #[error("failed to open '{}' for {}: {source}", .path.display(), .kind.describe())]
    Redirect {
        path: PathBuf,
        kind: RedirectKind,
        #[source]
        source: io::Error,
    },

    /// The OS refused to create a child process.
    #[error("cannot create child process: {0}")]
    Fork(#[source] io::Error),

    /// A durable file could not be read or written.
    #[error(transparent)]
    Resource(#[from] anyhow::Error),
}

impl ShellError {
    /// Only a failure to create children ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::Fork(_))
    }
}
