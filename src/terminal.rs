//! Terminal input driver: raw-mode switching and key decoding.

use anyhow::{Context, Result};
use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use std::io::{self, IsTerminal, Read};
use tracing::{debug, warn};

const ESC: u8 = 0x1b;
const EOT: u8 = 0x04;

/// Logical input events produced from terminal bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(u8),
    Enter,
    Backspace,
    Tab,
    Up,
    Down,
    Eof,
}

/// Decodes a byte stream into [`Key`]s, one blocking read at a time.
pub struct KeyReader<R> {
    input: R,
}

impl<R: Read> KeyReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Next logical key. Unknown escape sequences are swallowed.
    pub fn next_key(&mut self) -> io::Result<Key> {
        loop {
            let Some(byte) = self.next_byte()? else {
                return Ok(Key::Eof);
            };
            let key = match byte {
                b'\n' | b'\r' => Key::Enter,
                b'\t' => Key::Tab,
                0x08 | 0x7f => Key::Backspace,
                EOT => Key::Eof,
                ESC => match self.escape_sequence()? {
                    Some(key) => key,
                    None => continue,
                },
                other => Key::Char(other),
            };
            return Ok(key);
        }
    }

    /// `ESC [ A` and `ESC [ B`; every other CSI or SS3 sequence is read to its
    /// final byte and yields `None`. The stream ending mid-sequence is `Eof`.
    fn escape_sequence(&mut self) -> io::Result<Option<Key>> {
        match self.next_byte()? {
            None => Ok(Some(Key::Eof)),
            Some(b'[') => self.csi_sequence(),
            Some(b'O') => Ok(match self.next_byte()? {
                None => Some(Key::Eof),
                Some(last) => {
                    debug!(byte = last, "discarding SS3 sequence");
                    None
                }
            }),
            Some(other) => {
                debug!(byte = other, "discarding escape sequence");
                Ok(None)
            }
        }
    }

    /// Parameter and intermediate bytes (0x20..=0x3f) up to the final byte.
    fn csi_sequence(&mut self) -> io::Result<Option<Key>> {
        let mut bare = true;
        loop {
            let Some(byte) = self.next_byte()? else {
                return Ok(Some(Key::Eof));
            };
            match byte {
                0x20..=0x3f => bare = false,
                b'A' if bare => return Ok(Some(Key::Up)),
                b'B' if bare => return Ok(Some(Key::Down)),
                _ => {
                    debug!(byte, "discarding CSI sequence");
                    return Ok(None);
                }
            }
        }
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Puts the terminal into non-canonical, no-echo mode for its lifetime.
///
/// When standard input is not a terminal nothing is changed and the guard
/// is inert.
pub struct RawModeGuard {
    original: Option<Termios>,
}

impl RawModeGuard {
    pub fn enable() -> Result<Self> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            debug!("stdin is not a terminal, raw mode not enabled");
            return Ok(Self { original: None });
        }

        let original = termios::tcgetattr(&stdin).context("tcgetattr failed")?;
        let guard = Self {
            original: Some(original),
        };
        guard.apply_raw()?;
        Ok(guard)
    }

    pub fn is_raw(&self) -> bool {
        self.original.is_some()
    }

    /// Run `f` with the original terminal settings, then switch back to raw.
    pub fn suspended<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        self.restore()?;
        let result = f();
        self.apply_raw()?;
        Ok(result)
    }

    fn apply_raw(&self) -> Result<()> {
        let Some(original) = &self.original else {
            return Ok(());
        };
        let mut raw = original.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(io::stdin(), SetArg::TCSAFLUSH, &raw).context("tcsetattr failed")
    }

    fn restore(&self) -> Result<()> {
        let Some(original) = &self.original else {
            return Ok(());
        };
        termios::tcsetattr(io::stdin(), SetArg::TCSAFLUSH, original).context("tcsetattr failed")
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("failed to restore terminal settings: {e:#}");
        }
    }
}
