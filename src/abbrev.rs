//! The `key:value` abbreviation mapping and the expander that applies it.

use anyhow::{Context, Result, bail};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Key under which the home directory is always registered.
pub const HOME_KEY: &str = "~";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation {
    pub key: String,
    pub value: String,
}

impl Abbreviation {
    /// Split a stored record at its first `:`.
    fn parse(record: &str) -> Option<Self> {
        let (key, value) = record.split_once(':')?;
        Some(Abbreviation {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Result of [`AbbreviationStore::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Added,
    Updated,
}

pub struct AbbreviationStore {
    path: PathBuf,
    capacity: usize,
}

impl AbbreviationStore {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
        }
    }

    /// All abbreviations in storage order. A missing file is an empty mapping.
    pub fn entries(&self) -> Result<Vec<Abbreviation>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to open {}", self.path.display()));
            }
        };
        Ok(content.lines().filter_map(Abbreviation::parse).collect())
    }

    /// Insert `key -> value`, or update the value of an existing key in place.
    pub fn set(&self, value: &str, key: &str) -> Result<SetOutcome> {
        if key.contains(':') || value.contains(':') {
            bail!("':' is not allowed in value or key.");
        }
        if key.is_empty() {
            bail!("abbreviation key must not be empty");
        }

        let mut entries = self.entries()?;
        let len = entries.len();
        let outcome = match entries.iter_mut().find(|e| e.key == key) {
            Some(existing) => {
                existing.value = value.to_string();
                SetOutcome::Updated
            }
            None if len < self.capacity => {
                entries.push(Abbreviation {
                    key: key.to_string(),
                    value: value.to_string(),
                });
                SetOutcome::Added
            }
            None => bail!(
                "too many abbreviations (limit {}), cannot add '{key}'",
                self.capacity
            ),
        };

        self.write(&entries)?;
        debug!(key, value, ?outcome, "abbreviation stored");
        Ok(outcome)
    }

    /// Empty the mapping and register `~` for `home` again.
    pub fn clear(&self, home: &str) -> Result<()> {
        self.write(&[])?;
        debug!("abbreviations cleared");
        self.set(home, HOME_KEY).map(|_| ())
    }

    /// Expand the current mapping into `line`.
    pub fn expand(&self, line: &str, max_len: usize) -> Result<Expanded> {
        Ok(expand(line, &self.entries()?, max_len))
    }

    fn write(&self, entries: &[Abbreviation]) -> Result<()> {
        let mut content = String::new();
        for entry in entries {
            content.push_str(&format!("{}:{}\n", entry.key, entry.value));
        }
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

/// Output of the expander.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expanded {
    pub line: String,
    /// Set when an expansion overflowed `max_len` and the line was cut.
    pub truncated: bool,
}

/// Replace every occurrence of each key with its value.
///
/// Entries are applied in order, each as one left-to-right non-overlapping
/// pass over the output of the previous entry. Text inserted by an entry is
/// never rescanned for that same entry. Once the line grows past `max_len`
/// bytes it is cut to fit and no further entries are applied.
pub fn expand(line: &str, entries: &[Abbreviation], max_len: usize) -> Expanded {
    let mut current = line.to_string();
    for entry in entries.iter().filter(|e| !e.key.is_empty()) {
        if !current.contains(&entry.key) {
            continue;
        }
        current = current.replace(&entry.key, &entry.value);
        if current.len() > max_len {
            warn!(max_len, key = %entry.key, "expanded line exceeds maximum input length");
            truncate_to(&mut current, max_len);
            return Expanded {
                line: current,
                truncated: true,
            };
        }
    }
    Expanded {
        line: current,
        truncated: false,
    }
}

fn truncate_to(text: &mut String, max_len: usize) {
    let mut cut = max_len.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
