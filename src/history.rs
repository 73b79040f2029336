//! Durable command history.
//!
//! Two files back the store. The log holds every submitted line in order, one
//! per line, so a 1-based line number is the entry's position. The ranked
//! index holds one `<count> <command>` record per distinct command, sorted by
//! count descending, and is rewritten in full on every [`HistoryStore::record`].
//! Files are opened and closed on every call; no handle outlives an operation.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// `<count><whitespace><command>`; anything else in the ranked file is ignored.
static RANKED_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+-]?\d+)\s+(.+)$").expect("ranked record pattern is valid")
});

/// A distinct command and how many times it was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub count: i64,
    pub command: String,
}

impl RankedEntry {
    fn parse(record: &str) -> Option<Self> {
        let caps = RANKED_RECORD.captures(record)?;
        Some(RankedEntry {
            count: caps[1].parse().ok()?,
            command: caps[2].to_string(),
        })
    }
}

pub struct HistoryStore {
    log_path: PathBuf,
    ranked_path: PathBuf,
    total: usize,
    rank_capacity: usize,
}

impl HistoryStore {
    /// Open (creating if needed) the history log and count its entries.
    pub fn open(
        log_path: impl Into<PathBuf>,
        ranked_path: impl Into<PathBuf>,
        rank_capacity: usize,
    ) -> Result<Self> {
        let log_path = log_path.into();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to create or open {}", log_path.display()))?;

        let mut store = Self {
            log_path,
            ranked_path: ranked_path.into(),
            total: 0,
            rank_capacity,
        };
        store.total = store.count_entries()?;
        debug!(total = store.total, path = %store.log_path.display(), "history opened");
        Ok(store)
    }

    /// Number of entries recorded in the log.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Append a submitted line and fold it into the ranked index.
    ///
    /// Empty lines (with or without their newline) are never recorded. The
    /// total is bumped once the log write succeeds, even if the ranked
    /// rewrite fails afterwards.
    pub fn record(&mut self, line: &str) -> Result<()> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        if line.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("failed to create or open {}", self.log_path.display()))?;
        if self.missing_final_newline()? {
            writeln!(file)
                .with_context(|| format!("failed to write to {}", self.log_path.display()))?;
        }
        writeln!(file, "{line}")
            .with_context(|| format!("failed to write to {}", self.log_path.display()))?;
        drop(file);

        self.total += 1;
        debug!(total = self.total, "history entry recorded");
        self.rank_update(line)
    }

    /// Truncate the log and reset the total. The ranked index is left alone.
    pub fn clear(&mut self) -> Result<()> {
        File::create(&self.log_path)
            .with_context(|| format!("failed to open {}", self.log_path.display()))?;
        self.total = 0;
        debug!("history cleared");
        Ok(())
    }

    /// Entry at a 1-based position, `None` when out of range.
    pub fn lookup(&self, position: usize) -> Result<Option<String>> {
        if position == 0 {
            return Ok(None);
        }
        let content = self.read_log()?;
        Ok(content.lines().nth(position - 1).map(str::to_owned))
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Result<Vec<String>> {
        Ok(self.read_log()?.lines().map(str::to_owned).collect())
    }

    /// Current ranked index in persisted order.
    pub fn ranked(&self) -> Result<Vec<RankedEntry>> {
        let content = match fs::read_to_string(&self.ranked_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to open {}", self.ranked_path.display())
                });
            }
        };
        Ok(content.lines().filter_map(RankedEntry::parse).collect())
    }

    /// Read-merge-sort-rewrite of the ranked index with `line` counted once more.
    pub fn rank_update(&self, line: &str) -> Result<()> {
        let mut merged: Vec<RankedEntry> = Vec::new();
        for entry in self.ranked()? {
            let len = merged.len();
            match merged.iter_mut().find(|m| m.command == entry.command) {
                Some(existing) => existing.count += entry.count,
                None if len < self.rank_capacity => merged.push(entry),
                None => {}
            }
        }

        let len = merged.len();
        match merged.iter_mut().find(|m| m.command == line) {
            Some(existing) => existing.count += 1,
            None if len < self.rank_capacity => merged.push(RankedEntry {
                count: 1,
                command: line.to_string(),
            }),
            None => warn!(capacity = self.rank_capacity, "ranked history is full, '{line}' not ranked"),
        }

        merged.sort_by(|a, b| b.count.cmp(&a.count));
        write_ranked(&self.ranked_path, &merged)
    }

    /// Highest-ranked command starting with `prefix`.
    pub fn rank_prefix_lookup(&self, prefix: &str) -> Result<Option<String>> {
        Ok(self
            .ranked()?
            .into_iter()
            .find(|entry| entry.command.starts_with(prefix))
            .map(|entry| entry.command))
    }

    fn read_log(&self) -> Result<String> {
        fs::read_to_string(&self.log_path)
            .with_context(|| format!("failed to open {}", self.log_path.display()))
    }

    /// Counts lines the way [`HistoryStore::lookup`] sees them, an unterminated
    /// last line included.
    fn count_entries(&self) -> Result<usize> {
        let bytes = fs::read(&self.log_path)
            .with_context(|| format!("failed to open {}", self.log_path.display()))?;
        let newlines = bytes.iter().filter(|b| **b == b'\n').count();
        Ok(match bytes.last() {
            Some(b'\n') | None => newlines,
            Some(_) => newlines + 1,
        })
    }

    fn missing_final_newline(&self) -> Result<bool> {
        let mut file = File::open(&self.log_path)
            .with_context(|| format!("failed to open {}", self.log_path.display()))?;
        if file.metadata()?.len() == 0 {
            return Ok(false);
        }
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        Ok(last[0] != b'\n')
    }
}

fn write_ranked(path: &Path, entries: &[RankedEntry]) -> Result<()> {
    let mut content = String::new();
    for entry in entries {
        content.push_str(&format!("{} {}\n", entry.count, entry.command));
    }
    fs::write(path, content).with_context(|| format!("failed to rewrite {}", path.display()))?;
    debug!(entries = entries.len(), "ranked history rewritten");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> HistoryStore {
        HistoryStore::open(
            dir.path().join(".history"),
            dir.path().join(".sorted_history"),
            16,
        )
        .unwrap()
    }

    #[test]
    fn test_record_appends_and_lookup_returns_it() {
        let dir = TempDir::new().unwrap();
        let mut history = open_store(&dir);
        assert_eq!(history.total(), 0);

        history.record("ls -la\n").unwrap();
        history.record("echo hi").unwrap();

        assert_eq!(history.total(), 2);
        assert_eq!(history.lookup(1).unwrap().as_deref(), Some("ls -la"));
        assert_eq!(history.lookup(history.total()).unwrap().as_deref(), Some("echo hi"));
        assert_eq!(history.lookup(3).unwrap(), None);
        assert_eq!(history.lookup(0).unwrap(), None);

        let log = fs::read_to_string(dir.path().join(".history")).unwrap();
        assert_eq!(log, "ls -la\necho hi\n");
    }

    #[test]
    fn test_empty_lines_are_not_recorded() {
        let dir = TempDir::new().unwrap();
        let mut history = open_store(&dir);
        history.record("").unwrap();
        history.record("\n").unwrap();
        assert_eq!(history.total(), 0);
        assert!(history.ranked().unwrap().is_empty());
    }

    #[test]
    fn test_total_is_recovered_on_open() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".history"), "a\nb\nc\n").unwrap();
        let history = open_store(&dir);
        assert_eq!(history.total(), 3);
        assert_eq!(history.entries().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn test_unterminated_last_line_is_kept_separate() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".history"), "a\nb").unwrap();
        let mut history = open_store(&dir);
        assert_eq!(history.total(), 2);

        history.record("c").unwrap();
        assert_eq!(history.total(), 3);
        assert_eq!(history.entries().unwrap(), ["a", "b", "c"]);
        assert_eq!(history.lookup(3).unwrap().as_deref(), Some("c"));
    }

    #[test]
    fn test_clear_keeps_ranked_index() {
        let dir = TempDir::new().unwrap();
        let mut history = open_store(&dir);
        history.record("make test").unwrap();
        history.clear().unwrap();

        assert_eq!(history.total(), 0);
        assert!(history.entries().unwrap().is_empty());
        assert_eq!(
            history.rank_prefix_lookup("make").unwrap().as_deref(),
            Some("make test")
        );
    }

    #[test]
    fn test_ranked_index_sorted_by_usage() {
        let dir = TempDir::new().unwrap();
        let mut history = open_store(&dir);
        for line in ["git status", "git log", "git status", "ls", "git status", "git log"] {
            history.record(line).unwrap();
        }

        let ranked = history.ranked().unwrap();
        let view: Vec<(i64, &str)> = ranked.iter().map(|e| (e.count, e.command.as_str())).collect();
        assert_eq!(view, [(3, "git status"), (2, "git log"), (1, "ls")]);

        let raw = fs::read_to_string(dir.path().join(".sorted_history")).unwrap();
        assert_eq!(raw, "3 git status\n2 git log\n1 ls\n");
    }

    #[test]
    fn test_prefix_lookup_prefers_highest_count() {
        let dir = TempDir::new().unwrap();
        let mut history = open_store(&dir);
        history.record("echo hello").unwrap();
        history.record("echo hi").unwrap();
        history.record("echo hi").unwrap();
        history.record("exit-code").unwrap();

        assert_eq!(history.rank_prefix_lookup("e").unwrap().as_deref(), Some("echo hi"));
        assert_eq!(history.rank_prefix_lookup("echo he").unwrap().as_deref(), Some("echo hello"));
        assert_eq!(history.rank_prefix_lookup("zzz").unwrap(), None);
    }

    #[test]
    fn test_duplicate_records_are_merged_and_bumped_once() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".sorted_history"),
            "2 ls\n5 pwd\n3 ls\ngarbage line\n",
        )
        .unwrap();
        let history = open_store(&dir);
        history.rank_update("ls").unwrap();

        let ranked = history.ranked().unwrap();
        assert_eq!(
            ranked,
            [
                RankedEntry { count: 6, command: "ls".into() },
                RankedEntry { count: 5, command: "pwd".into() },
            ]
        );
    }

    #[test]
    fn test_rank_capacity_drops_overflow() {
        let dir = TempDir::new().unwrap();
        let mut history = HistoryStore::open(
            dir.path().join(".history"),
            dir.path().join(".sorted_history"),
            2,
        )
        .unwrap();
        history.record("a").unwrap();
        history.record("b").unwrap();
        history.record("c").unwrap();

        assert_eq!(history.total(), 3);
        let commands: Vec<String> = history.ranked().unwrap().into_iter().map(|e| e.command).collect();
        assert_eq!(commands, ["a", "b"]);
    }
}
