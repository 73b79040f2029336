//! In-line editing on top of [`KeyReader`]: echo, backspace, history recall
//! with the arrow keys and TAB completion from the ranked history.

use crate::history::HistoryStore;
use crate::terminal::{Key, KeyReader};
use anyhow::Result;
use std::io::{Read, Write};
use tracing::{trace, warn};

/// Moves the cursor back one column, blanks it and moves back again.
const ERASE: &[u8] = b"\x08 \x08";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Empty,
    Editing,
    HistoryBrowsing,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The submitted line, without its newline. Empty when Enter was pressed
    /// on an empty line.
    Line(String),
    Eof,
}

pub struct LineEditor {
    max_len: usize,
}

impl LineEditor {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Print `prompt` and edit one line until Enter or end of input.
    pub fn read_line<R: Read, W: Write>(
        &self,
        prompt: &str,
        keys: &mut KeyReader<R>,
        out: &mut W,
        history: &HistoryStore,
    ) -> Result<ReadOutcome> {
        out.write_all(prompt.as_bytes())?;
        out.flush()?;

        let mut session = EditSession {
            out,
            history,
            max_len: self.max_len,
            buffer: Vec::new(),
            state: EditorState::Empty,
            position: history.total() + 1,
        };

        while session.state != EditorState::Submitted {
            let key = keys.next_key()?;
            trace!(?key, state = ?session.state, "key");
            match key {
                Key::Eof => return Ok(ReadOutcome::Eof),
                Key::Enter => session.submit()?,
                Key::Char(byte) => session.push(byte)?,
                Key::Backspace => session.backspace()?,
                Key::Up => session.recall_previous()?,
                Key::Down => session.recall_next()?,
                Key::Tab => session.complete()?,
            }
            session.out.flush()?;
        }
        Ok(ReadOutcome::Line(
            String::from_utf8_lossy(&session.buffer).into_owned(),
        ))
    }
}

struct EditSession<'a, W> {
    out: &'a mut W,
    history: &'a HistoryStore,
    max_len: usize,
    buffer: Vec<u8>,
    state: EditorState,
    /// 1-based history position being browsed; `total + 1` is "below the last entry".
    position: usize,
}

impl<W: Write> EditSession<'_, W> {
    fn push(&mut self, byte: u8) -> Result<()> {
        if self.buffer.len() >= self.max_len {
            return Ok(());
        }
        self.buffer.push(byte);
        self.out.write_all(&[byte])?;
        self.state = EditorState::Editing;
        Ok(())
    }

    fn backspace(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        // drop continuation bytes, then the lead byte
        while let Some(byte) = self.buffer.pop() {
            if byte & 0xc0 != 0x80 {
                break;
            }
        }
        self.out.write_all(ERASE)?;
        if self.buffer.is_empty() {
            self.state = EditorState::Empty;
        }
        Ok(())
    }

    fn recall_previous(&mut self) -> Result<()> {
        if self.position <= 1 {
            return Ok(());
        }
        self.position -= 1;
        self.show_history_entry()
    }

    fn recall_next(&mut self) -> Result<()> {
        let total = self.history.total();
        if self.position < total {
            self.position += 1;
            self.show_history_entry()
        } else if self.position == total {
            self.position += 1;
            self.replace(b"")?;
            self.state = EditorState::Empty;
            Ok(())
        } else {
            Ok(())
        }
    }

    fn show_history_entry(&mut self) -> Result<()> {
        let entry = match self.history.lookup(self.position) {
            Ok(entry) => entry.unwrap_or_default(),
            Err(e) => {
                warn!("history lookup failed: {e:#}");
                String::new()
            }
        };
        self.replace(entry.as_bytes())?;
        self.state = EditorState::HistoryBrowsing;
        Ok(())
    }

    fn complete(&mut self) -> Result<()> {
        let prefix = String::from_utf8_lossy(&self.buffer).into_owned();
        match self.history.rank_prefix_lookup(&prefix) {
            Ok(Some(command)) => {
                self.replace(command.as_bytes())?;
                self.state = EditorState::Editing;
            }
            Ok(None) => {}
            Err(e) => warn!("completion lookup failed: {e:#}"),
        }
        Ok(())
    }

    /// Erase the visible line and show `text` instead.
    fn replace(&mut self, text: &[u8]) -> Result<()> {
        let visible = String::from_utf8_lossy(&self.buffer).chars().count();
        for _ in 0..visible {
            self.out.write_all(ERASE)?;
        }
        self.buffer.clear();
        self.buffer
            .extend_from_slice(&text[..text.len().min(self.max_len)]);
        self.out.write_all(&self.buffer)?;
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        self.out.write_all(b"\n")?;
        self.state = EditorState::Submitted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn history_with(dir: &TempDir, lines: &[&str]) -> HistoryStore {
        let mut history = HistoryStore::open(
            dir.path().join(".history"),
            dir.path().join(".sorted_history"),
            64,
        )
        .unwrap();
        for line in lines {
            history.record(line).unwrap();
        }
        history
    }

    fn run(input: &[u8], history: &HistoryStore) -> (ReadOutcome, String) {
        let editor = LineEditor::new(4096);
        let mut keys = KeyReader::new(input);
        let mut out = Vec::new();
        let outcome = editor.read_line("$ ", &mut keys, &mut out, history).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_typing_echoes_and_submits() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &[]);
        let (outcome, screen) = run(b"ls -l\n", &history);
        assert_eq!(outcome, ReadOutcome::Line("ls -l".into()));
        assert_eq!(screen, "$ ls -l\n");
    }

    #[test]
    fn test_backspace_erases_and_is_noop_when_empty() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &[]);
        let (outcome, screen) = run(b"\x7fab\x7fc\n", &history);
        assert_eq!(outcome, ReadOutcome::Line("ac".into()));
        assert_eq!(screen, "$ ab\x08 \x08c\n");
    }

    #[test]
    fn test_backspace_removes_whole_utf8_char() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &[]);
        let (outcome, _) = run("aé\x7f\n".as_bytes(), &history);
        assert_eq!(outcome, ReadOutcome::Line("a".into()));
    }

    #[test]
    fn test_up_recalls_and_clamps_at_first_entry() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &["first", "second"]);
        let (outcome, _) = run(b"\x1b[A\x1b[A\x1b[A\x1b[A\n", &history);
        assert_eq!(outcome, ReadOutcome::Line("first".into()));
    }

    #[test]
    fn test_down_past_last_entry_clears_once() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &["first", "second"]);
        let (outcome, screen) = run(b"\x1b[A\x1b[B\x1b[B\n", &history);
        assert_eq!(outcome, ReadOutcome::Line(String::new()));
        // "second" shown, then erased exactly once; the extra Down changes nothing
        assert_eq!(screen, format!("$ second{}\n", "\x08 \x08".repeat(6)));
    }

    #[test]
    fn test_down_without_history_is_noop() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &[]);
        let (outcome, screen) = run(b"x\x1b[B\n", &history);
        assert_eq!(outcome, ReadOutcome::Line("x".into()));
        assert_eq!(screen, "$ x\n");
    }

    #[test]
    fn test_tab_completes_most_used_command() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &["echo hello", "echo hi", "echo hi"]);
        let (outcome, screen) = run(b"e\t\n", &history);
        assert_eq!(outcome, ReadOutcome::Line("echo hi".into()));
        assert_eq!(screen, "$ e\x08 \x08echo hi\n");
    }

    #[test]
    fn test_tab_without_match_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &["ls"]);
        let (outcome, screen) = run(b"zz\t\n", &history);
        assert_eq!(outcome, ReadOutcome::Line("zz".into()));
        assert_eq!(screen, "$ zz\n");
    }

    #[test]
    fn test_submit_stops_reading_at_enter() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &[]);
        let editor = LineEditor::new(4096);
        let mut keys = KeyReader::new(&b"one\ntwo\n"[..]);
        let mut out = Vec::new();

        let first = editor.read_line("$ ", &mut keys, &mut out, &history).unwrap();
        let second = editor.read_line("$ ", &mut keys, &mut out, &history).unwrap();
        assert_eq!(first, ReadOutcome::Line("one".into()));
        assert_eq!(second, ReadOutcome::Line("two".into()));
        assert_eq!(String::from_utf8(out).unwrap(), "$ one\n$ two\n");
    }

    #[test]
    fn test_eof_ends_reading() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &[]);
        let (outcome, _) = run(b"partial", &history);
        assert_eq!(outcome, ReadOutcome::Eof);
    }

    #[test]
    fn test_input_is_bounded() {
        let dir = TempDir::new().unwrap();
        let history = history_with(&dir, &[]);
        let editor = LineEditor::new(3);
        let mut keys = KeyReader::new(&b"abcdef\n"[..]);
        let mut out = Vec::new();
        let outcome = editor.read_line("", &mut keys, &mut out, &history).unwrap();
        assert_eq!(outcome, ReadOutcome::Line("abc".into()));
    }
}
