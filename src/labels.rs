//! Directory labels: a prompt color and an optional description per directory.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The eight basic ANSI foreground colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl LabelColor {
    pub const NAMES: [&'static str; 8] = [
        "black", "red", "green", "yellow", "blue", "magenta", "cyan", "white",
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let color = match name.to_ascii_lowercase().as_str() {
            "black" => LabelColor::Black,
            "red" => LabelColor::Red,
            "green" => LabelColor::Green,
            "yellow" => LabelColor::Yellow,
            "blue" => LabelColor::Blue,
            "magenta" => LabelColor::Magenta,
            "cyan" => LabelColor::Cyan,
            "white" => LabelColor::White,
            _ => return None,
        };
        Some(color)
    }

    /// SGR foreground code, 30..=37.
    pub fn code(self) -> u8 {
        30 + self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub path: PathBuf,
    pub code: u8,
    pub description: String,
}

impl Label {
    /// `<path>\t<code>\t<description>`
    fn parse(record: &str) -> Option<Self> {
        let mut fields = record.splitn(3, '\t');
        let path = fields.next().filter(|p| !p.is_empty())?;
        let code = fields.next()?.trim().parse().ok()?;
        Some(Label {
            path: PathBuf::from(path),
            code,
            description: fields.next().unwrap_or_default().to_string(),
        })
    }
}

pub struct LabelStore {
    path: PathBuf,
}

impl LabelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn entries(&self) -> Result<Vec<Label>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to open {}", self.path.display()));
            }
        };
        Ok(content.lines().filter_map(Label::parse).collect())
    }

    /// Label `dir`, replacing any label it already has.
    pub fn set(&self, dir: &Path, color: LabelColor, description: &str) -> Result<()> {
        let mut labels = self.entries()?;
        labels.retain(|label| label.path != dir);
        labels.push(Label {
            path: dir.to_path_buf(),
            code: color.code(),
            description: description.to_string(),
        });

        let mut content = String::new();
        for label in &labels {
            content.push_str(&format!(
                "{}\t{}\t{}\n",
                label.path.display(),
                label.code,
                label.description
            ));
        }
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(dir = %dir.display(), code = color.code(), "directory labeled");
        Ok(())
    }

    /// Color of the most specific labeled ancestor of `dir` (or `dir` itself).
    pub fn color_for(&self, dir: &Path) -> Result<Option<u8>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|label| dir.starts_with(&label.path))
            .max_by_key(|label| label.path.components().count())
            .map(|label| label.code))
    }

    /// Description of `dir` itself, if it has a non-empty one.
    pub fn description_for(&self, dir: &Path) -> Result<Option<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|label| label.path == dir)
            .map(|label| label.description)
            .filter(|description| !description.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_color_codes() {
        assert_eq!(LabelColor::Black.code(), 30);
        assert_eq!(LabelColor::White.code(), 37);
        assert_eq!(LabelColor::from_name("Cyan"), Some(LabelColor::Cyan));
        assert_eq!(LabelColor::from_name("purple"), None);
        for name in LabelColor::NAMES {
            assert!(LabelColor::from_name(name).is_some());
        }
    }

    #[test]
    fn test_longest_prefix_wins_for_color() {
        let dir = TempDir::new().unwrap();
        let store = LabelStore::new(dir.path().join(".labeled_dirs"));
        store.set(Path::new("/work"), LabelColor::Red, "").unwrap();
        store.set(Path::new("/work/project"), LabelColor::Green, "main project").unwrap();

        assert_eq!(store.color_for(Path::new("/work/project/src")).unwrap(), Some(32));
        assert_eq!(store.color_for(Path::new("/work/other")).unwrap(), Some(31));
        assert_eq!(store.color_for(Path::new("/workbench")).unwrap(), None);
    }

    #[test]
    fn test_description_needs_exact_match() {
        let dir = TempDir::new().unwrap();
        let store = LabelStore::new(dir.path().join(".labeled_dirs"));
        store.set(Path::new("/work/project"), LabelColor::Blue, "main project").unwrap();

        assert_eq!(
            store.description_for(Path::new("/work/project")).unwrap().as_deref(),
            Some("main project")
        );
        assert_eq!(store.description_for(Path::new("/work/project/src")).unwrap(), None);
    }

    #[test]
    fn test_relabel_replaces() {
        let dir = TempDir::new().unwrap();
        let store = LabelStore::new(dir.path().join(".labeled_dirs"));
        store.set(Path::new("/srv"), LabelColor::Red, "old").unwrap();
        store.set(Path::new("/srv"), LabelColor::Yellow, "new").unwrap();

        let labels = store.entries().unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].code, 33);
        assert_eq!(labels[0].description, "new");
    }
}
