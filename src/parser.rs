//! Turns a submitted line into a [`Pipeline`] of [`Stage`]s.
//!
//! Parsing happens in two passes. The line is first cut on every `|` into
//! stage substrings; empty substrings are kept so that `ls |` fails at
//! dispatch time instead of silently running `ls`. Each substring is then
//! split on whitespace (no quoting, no escaping) and scanned for the first
//! redirection operator, which ends the argument vector.

use crate::error::ShellError;
use std::path::Path;

/// Kind of redirection
///
/// Defines the specific operation mode for an I/O redirection (`<`, `>`, `>>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Input redirection (`<`): Reads standard input from a specified file.
    Input,
    /// Output redirection (`>`): Writes standard output to a file, **overwriting** the file if it exists.
    Output,
    /// Output redirection with append (`>>`): Writes standard output to a file, **appending** to the file if it exists.
    Append,
}

impl RedirectKind {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" => Some(RedirectKind::Input),
            ">" => Some(RedirectKind::Output),
            ">>" => Some(RedirectKind::Append),
            _ => None,
        }
    }

    /// The operator as typed by the user.
    pub fn operator(self) -> &'static str {
        match self {
            RedirectKind::Input => "<",
            RedirectKind::Output => ">",
            RedirectKind::Append => ">>",
        }
    }

    pub(crate) fn describe(self) -> &'static str {
        match self {
            RedirectKind::Input => "input redirection",
            RedirectKind::Output => "output redirection",
            RedirectKind::Append => "append output redirection",
        }
    }
}

/// An I/O redirection attached to one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    /// Token following the operator; `None` when the operator ended the stage.
    pub target: Option<String>,
}

impl Redirect {
    /// The file to open, or the dispatch error for a dangling operator.
    pub fn target(&self) -> Result<&Path, ShellError> {
        self.target
            .as_deref()
            .map(Path::new)
            .ok_or(ShellError::MissingRedirectTarget(self.kind))
    }
}

/// One command of a pipeline: its argument vector and optional redirection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stage {
    /// Command name followed by its arguments. Never contains the redirection.
    pub argv: Vec<String>,
    pub redirect: Option<Redirect>,
}

impl Stage {
    /// Tokenize one stage substring.
    pub fn parse(text: &str) -> Self {
        let mut argv: Vec<String> = text.split_whitespace().map(str::to_owned).collect();

        let position = argv
            .iter()
            .position(|token| RedirectKind::from_token(token).is_some());
        let redirect = position.and_then(|pos| {
            let kind = RedirectKind::from_token(&argv[pos])?;
            let target = argv.get(pos + 1).cloned();
            argv.truncate(pos);
            Some(Redirect { kind, target })
        });

        Stage { argv, redirect }
    }

    /// The command name, or [`ShellError::NoCommand`] for an empty stage.
    pub fn name(&self) -> Result<&str, ShellError> {
        self.argv
            .first()
            .map(String::as_str)
            .ok_or(ShellError::NoCommand)
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }
}

/// Ordered, non-empty sequence of stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.stages.len() == 1
    }
}

/// Split a line into pipeline stages.
///
/// A trailing newline is ignored. The result always holds at least one stage
/// because `str::split` yields at least one piece.
pub fn parse_pipeline(line: &str) -> Pipeline {
    let line = line.strip_suffix('\n').unwrap_or(line);
    Pipeline {
        stages: line.split('|').map(Stage::parse).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(stage: &Stage) -> Vec<&str> {
        stage.argv.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_three_stage_pipeline() {
        let pipeline = parse_pipeline("a | b | c");
        assert_eq!(pipeline.len(), 3);
        for (stage, name) in pipeline.stages().iter().zip(["a", "b", "c"]) {
            assert_eq!(stage.name().unwrap(), name);
            assert!(stage.redirect.is_none());
        }
    }

    #[test]
    fn test_input_redirection_in_first_stage() {
        let pipeline = parse_pipeline("grep 2 < out.txt | wc -l");
        assert_eq!(pipeline.len(), 2);

        let first = &pipeline.stages()[0];
        assert_eq!(argv(first), ["grep", "2"]);
        assert_eq!(
            first.redirect,
            Some(Redirect {
                kind: RedirectKind::Input,
                target: Some("out.txt".to_string()),
            })
        );

        let second = &pipeline.stages()[1];
        assert_eq!(argv(second), ["wc", "-l"]);
        assert!(second.redirect.is_none());
    }

    #[test]
    fn test_append_and_truncate_operators() {
        let stage = Stage::parse("echo hi >> log.txt");
        assert_eq!(argv(&stage), ["echo", "hi"]);
        assert_eq!(stage.redirect.as_ref().unwrap().kind, RedirectKind::Append);

        let stage = Stage::parse("echo hi > log.txt");
        assert_eq!(stage.redirect.as_ref().unwrap().kind, RedirectKind::Output);
        assert_eq!(stage.redirect.as_ref().unwrap().target().unwrap(), Path::new("log.txt"));
    }

    #[test]
    fn test_first_operator_wins() {
        let stage = Stage::parse("sort < in.txt > out.txt");
        assert_eq!(argv(&stage), ["sort"]);
        let redirect = stage.redirect.unwrap();
        assert_eq!(redirect.kind, RedirectKind::Input);
        assert_eq!(redirect.target.as_deref(), Some("in.txt"));
    }

    #[test]
    fn test_operator_glued_to_word_is_literal() {
        let stage = Stage::parse("echo a>b");
        assert_eq!(argv(&stage), ["echo", "a>b"]);
        assert!(stage.redirect.is_none());
    }

    #[test]
    fn test_dangling_operator_reports_at_dispatch() {
        let stage = Stage::parse("ls >");
        assert_eq!(argv(&stage), ["ls"]);
        let err = stage.redirect.unwrap().target().unwrap_err();
        assert!(matches!(err, ShellError::MissingRedirectTarget(RedirectKind::Output)));
    }

    #[test]
    fn test_empty_stages_are_preserved() {
        let pipeline = parse_pipeline("ls || wc |");
        assert_eq!(pipeline.len(), 4);
        assert!(pipeline.stages()[1].argv.is_empty());
        assert!(pipeline.stages()[3].argv.is_empty());
        assert!(matches!(pipeline.stages()[1].name(), Err(ShellError::NoCommand)));
    }

    #[test]
    fn test_whitespace_runs_and_trailing_newline() {
        let pipeline = parse_pipeline("  ls\t -la   /tmp \n");
        assert!(pipeline.is_single());
        let stage = &pipeline.stages()[0];
        assert_eq!(argv(stage), ["ls", "-la", "/tmp"]);
        assert_eq!(stage.args(), ["-la".to_string(), "/tmp".to_string()]);
    }

    #[test]
    fn test_blank_line_is_single_empty_stage() {
        let pipeline = parse_pipeline("   ");
        assert!(pipeline.is_single());
        assert!(pipeline.stages()[0].argv.is_empty());
    }
}
