use crate::abbrev::{AbbreviationStore, HOME_KEY};
use crate::config::Config;
use crate::history::HistoryStore;
use crate::labels::LabelStore;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Session state shared by the line editor, built-ins and the executor.
///
/// The environment contains:
/// - the shell's home directory, mirrored to the `.home_path` file on every change;
/// - the cwd-changed flag the prompt layer polls to know when to recompute;
/// - the durable stores (history, abbreviations, directory labels).
///
/// The process working directory itself is not duplicated here: `cd` changes
/// it with [`std::env::set_current_dir`] so children inherit it.
pub struct Environment {
    system_home: PathBuf,
    home_dir: PathBuf,
    home_file: PathBuf,
    cwd_changed: bool,
    max_input_len: usize,
    pub history: HistoryStore,
    pub abbreviations: AbbreviationStore,
    pub labels: LabelStore,
}

impl Environment {
    /// Create the cache directory, open every store and record `$HOME` as
    /// the session's home directory.
    pub fn open(config: &Config) -> Result<Self> {
        config.ensure_cache_dir()?;

        let history = HistoryStore::open(
            config.history_file(),
            config.sorted_history_file(),
            config.rank_capacity,
        )?;
        let mut env = Self {
            system_home: config.system_home.clone(),
            home_dir: config.system_home.clone(),
            home_file: config.home_path_file(),
            cwd_changed: true,
            max_input_len: config.max_input_len,
            history,
            abbreviations: AbbreviationStore::new(
                config.abbreviation_file(),
                config.abbreviation_capacity,
            ),
            labels: LabelStore::new(config.labeled_dirs_file()),
        };

        let home = config.system_home.clone();
        env.set_home_dir(home)?;
        env.abbreviations
            .set(&config.system_home.to_string_lossy(), HOME_KEY)?;
        Ok(env)
    }

    /// Directory `cd` without arguments goes to and the prompt shortens to `~`.
    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Home directory reported by the system at start-up.
    pub fn system_home(&self) -> &Path {
        &self.system_home
    }

    /// Change the home directory and persist it to `.home_path`.
    pub fn set_home_dir(&mut self, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        fs::write(&self.home_file, format!("{}\n", dir.display()))
            .with_context(|| format!("failed to write {}", self.home_file.display()))?;
        debug!(home = %dir.display(), "home directory recorded");
        self.home_dir = dir;
        self.cwd_changed = true;
        Ok(())
    }

    pub fn max_input_len(&self) -> usize {
        self.max_input_len
    }

    /// Ask the prompt layer to recompute the displayed directory.
    pub fn mark_cwd_changed(&mut self) {
        self.cwd_changed = true;
    }

    /// Read and reset the cwd-changed flag.
    pub fn take_cwd_changed(&mut self) -> bool {
        std::mem::take(&mut self.cwd_changed)
    }
}
