use anyhow::{Context, Result, anyhow};
use std::env;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

const CACHE_DIR_NAME: &str = ".gogicache";
const HOME_PATH_FILE: &str = ".home_path";
const HISTORY_FILE: &str = ".history";
const SORTED_HISTORY_FILE: &str = ".sorted_history";
const ABBREVIATION_FILE: &str = ".abbreviation";
const LABELED_DIRS_FILE: &str = ".labeled_dirs";

/// Upper bound on the length of a single input line, in bytes.
pub const DEFAULT_MAX_INPUT_LEN: usize = 4096;
/// How many distinct commands the ranked history keeps.
pub const DEFAULT_RANK_CAPACITY: usize = 4096;
/// How many abbreviations the mapping may hold.
pub const DEFAULT_ABBREVIATION_CAPACITY: usize = 1024;

/// How the stages of a multi-stage pipeline are supervised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// Spawn every stage first, then wait for all of them in stage order.
    #[default]
    Concurrent,
    /// Spawn a stage and wait for it to exit before spawning the next one.
    ///
    /// A stage that writes more than the kernel pipe buffer holds before
    /// exiting never finishes in this mode.
    Sequential,
}

impl PipelineMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "concurrent" => Some(Self::Concurrent),
            "sequential" => Some(Self::Sequential),
            _ => None,
        }
    }
}

/// Process-wide settings, resolved once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    /// Home directory reported by the system (`$HOME`).
    pub system_home: PathBuf,
    /// Directory holding every durable file of the shell.
    pub cache_dir: PathBuf,
    pub max_input_len: usize,
    pub rank_capacity: usize,
    pub abbreviation_capacity: usize,
    pub pipeline_mode: PipelineMode,
}

impl Config {
    /// Settings rooted at `system_home`, with every other knob at its default.
    pub fn with_home(system_home: impl Into<PathBuf>) -> Self {
        let system_home = system_home.into();
        Self {
            cache_dir: system_home.join(CACHE_DIR_NAME),
            system_home,
            max_input_len: DEFAULT_MAX_INPUT_LEN,
            rank_capacity: DEFAULT_RANK_CAPACITY,
            abbreviation_capacity: DEFAULT_ABBREVIATION_CAPACITY,
            pipeline_mode: PipelineMode::default(),
        }
    }

    /// Read the configuration from the process environment.
    ///
    /// `HOME` is mandatory. `GOGISH_CACHE_DIR`, `GOGISH_MAX_INPUT` and
    /// `GOGISH_PIPELINE` override the defaults.
    pub fn from_env() -> Result<Self> {
        let home = env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("HOME environment variable not set"))?;
        let mut config = Self::with_home(home);

        if let Some(dir) = env::var_os("GOGISH_CACHE_DIR").filter(|d| !d.is_empty()) {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = env::var("GOGISH_MAX_INPUT") {
            config.max_input_len = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("GOGISH_MAX_INPUT must be a positive integer, got '{raw}'"))?;
        }
        if let Ok(raw) = env::var("GOGISH_PIPELINE") {
            config.pipeline_mode = PipelineMode::parse(&raw).ok_or_else(|| {
                anyhow!("GOGISH_PIPELINE must be 'concurrent' or 'sequential', got '{raw}'")
            })?;
        }
        Ok(config)
    }

    /// Create the cache directory (mode 0700) unless it already exists.
    pub fn ensure_cache_dir(&self) -> Result<()> {
        if self.cache_dir.is_dir() {
            return Ok(());
        }
        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&self.cache_dir)
            .with_context(|| format!("failed to create cache directory {}", self.cache_dir.display()))
    }

    pub fn home_path_file(&self) -> PathBuf {
        self.cache_file(HOME_PATH_FILE)
    }

    pub fn history_file(&self) -> PathBuf {
        self.cache_file(HISTORY_FILE)
    }

    pub fn sorted_history_file(&self) -> PathBuf {
        self.cache_file(SORTED_HISTORY_FILE)
    }

    pub fn abbreviation_file(&self) -> PathBuf {
        self.cache_file(ABBREVIATION_FILE)
    }

    pub fn labeled_dirs_file(&self) -> PathBuf {
        self.cache_file(LABELED_DIRS_FILE)
    }

    fn cache_file(&self, name: &str) -> PathBuf {
        Path::new(&self.cache_dir).join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_paths_live_under_cache_dir() {
        let config = Config::with_home("/home/someone");
        assert_eq!(config.cache_dir, PathBuf::from("/home/someone/.gogicache"));
        assert_eq!(
            config.history_file(),
            PathBuf::from("/home/someone/.gogicache/.history")
        );
        assert_eq!(
            config.sorted_history_file(),
            PathBuf::from("/home/someone/.gogicache/.sorted_history")
        );
        assert_eq!(config.pipeline_mode, PipelineMode::Concurrent);
    }

    #[test]
    fn test_pipeline_mode_parse() {
        assert_eq!(PipelineMode::parse("sequential"), Some(PipelineMode::Sequential));
        assert_eq!(PipelineMode::parse(" Concurrent "), Some(PipelineMode::Concurrent));
        assert_eq!(PipelineMode::parse("parallel"), None);
    }

    #[test]
    fn test_ensure_cache_dir_creates_private_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::with_home(tmp.path());
        config.cache_dir = tmp.path().join("nested").join("cache");

        config.ensure_cache_dir().unwrap();
        let meta = std::fs::metadata(&config.cache_dir).unwrap();
        assert!(meta.is_dir());
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);

        // second call is a no-op
        config.ensure_cache_dir().unwrap();
    }
}
