use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::pager::{PatternSet, DEFAULT_PAGE_THRESHOLD};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Threshold given to newly added texts
    pub page_threshold: usize,
    /// Patterns given to newly added texts
    pub patterns: PatternSet,
    /// Overrides the default database location
    pub database: Option<PathBuf>,
    pub active_text: Option<i64>,
    /// Saved reading offset (in chars) per text id
    pub positions: BTreeMap<i64, usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_threshold: DEFAULT_PAGE_THRESHOLD,
            patterns: PatternSet::default(),
            database: None,
            active_text: None,
            positions: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn position(&self, text_id: i64) -> usize {
        self.positions.get(&text_id).copied().unwrap_or(0)
    }

    pub fn set_position(&mut self, text_id: i64, offset: usize) {
        self.positions.insert(text_id, offset);
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.clone().or_else(AppDirs::db_path)
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("keytrace_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("ignoring unreadable config {}: {e}", self.path.display());
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::Replacement;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let mut cfg = Config {
            page_threshold: 80,
            patterns: PatternSet {
                ignore_patterns: vec!["\\t".into()],
                break_patterns: vec!["\\n\\n".into()],
                replacement_patterns: vec![Replacement {
                    search: "--".into(),
                    replace: "-".into(),
                }],
            },
            database: Some(dir.path().join("other.db")),
            active_text: Some(3),
            positions: BTreeMap::new(),
        };
        cfg.set_position(3, 1200);
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
        assert_eq!(loaded.position(3), 1200);
        assert_eq!(loaded.position(4), 0);
    }

    #[test]
    fn missing_or_corrupt_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), Config::default());

        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{ "active_text": 7 }"#).unwrap();
        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.active_text, Some(7));
        assert_eq!(cfg.page_threshold, DEFAULT_PAGE_THRESHOLD);
        assert_eq!(cfg.patterns, PatternSet::default());
    }
}
