use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{ConfigError, ConfigFile};

/// Owns every configuration file opened during a session, keyed by absolute
/// path, so repeated lookups of the same preset or settings file share one
/// in-memory document until it is flushed.
#[derive(Debug, Default)]
pub struct ConfigCache {
    files: HashMap<PathBuf, ConfigFile>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached document for `path`, reading it on first use.
    ///
    /// A document that fails to parse is replaced by an empty read-only one
    /// so callers keep running with defaults while the file on disk stays
    /// untouched.
    pub fn load(&mut self, path: &Path) -> &mut ConfigFile {
        let key = absolute_path(path);
        self.files.entry(key).or_insert_with_key(|key| {
            match ConfigFile::load(key.clone()) {
                Ok(file) => {
                    debug!(path = %key.display(), "loaded configuration file");
                    file
                }
                Err(err) => {
                    warn!(path = %key.display(), %err, "configuration unreadable; using defaults and leaving it untouched");
                    ConfigFile::unreadable(key.clone())
                }
            }
        })
    }

    /// Looks up an already cached document without touching the filesystem.
    pub fn get(&self, path: &Path) -> Option<&ConfigFile> {
        self.files.get(&absolute_path(path))
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.files.contains_key(&absolute_path(path))
    }

    /// Drops the cached copy so the next `load` re-reads the file.
    pub fn invalidate(&mut self, path: &Path) {
        self.files.remove(&absolute_path(path));
    }

    /// Writes every modified document; returns how many were written.
    pub fn flush(&mut self) -> Result<usize, ConfigError> {
        let mut written = 0;
        let mut first_error = None;
        for file in self.files.values_mut().filter(|file| file.is_modified()) {
            if file.is_read_only() {
                skip_unreadable(file);
                continue;
            }
            match file.save() {
                Ok(()) => written += 1,
                Err(err) => {
                    warn!(path = %file.path().display(), %err, "failed to flush configuration");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }

    /// Writes `path` if it is cached and modified. Returns `true` when the
    /// file on disk is up to date afterwards.
    pub fn flush_path(&mut self, path: &Path) -> Result<bool, ConfigError> {
        match self.files.get_mut(&absolute_path(path)) {
            Some(file) if file.is_read_only() => {
                skip_unreadable(file);
                Ok(false)
            }
            Some(file) if file.is_modified() => file.save().map(|()| true),
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }
}

fn skip_unreadable(file: &mut ConfigFile) {
    if file.is_modified() {
        warn!(path = %file.path().display(), "not saving changes over an unreadable configuration file");
        file.discard_changes();
    }
}

/// Lexically absolute form of `path`, without resolving symlinks, so files
/// that do not exist yet get a stable key too.
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GLOBAL_SECTION;

    #[test]
    fn load_returns_same_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("preset.ini");
        let mut cache = ConfigCache::new();
        cache
            .load(&path)
            .set(GLOBAL_SECTION, "Techniques", &["Bloom"])
            .unwrap();
        let techniques: Vec<String> = cache.load(&path).get(GLOBAL_SECTION, "Techniques").unwrap();
        assert_eq!(techniques, vec!["Bloom"]);
        assert!(!path.exists(), "nothing is written before flush");
    }

    #[test]
    fn flush_writes_only_modified_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let touched = dir.path().join("touched.ini");
        let untouched = dir.path().join("untouched.ini");
        let mut cache = ConfigCache::new();
        cache.load(&untouched);
        cache
            .load(&touched)
            .set("GENERAL", "PerformanceMode", &true)
            .unwrap();

        assert_eq!(cache.flush().unwrap(), 1);
        assert!(touched.exists());
        assert!(!untouched.exists());
        assert_eq!(cache.flush().unwrap(), 0);
    }

    #[test]
    fn invalidate_rereads_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("runtime.ini");
        std::fs::write(&path, "[GENERAL]\nPerformanceMode = true\n").unwrap();

        let mut cache = ConfigCache::new();
        assert_eq!(cache.load(&path).get::<bool>("GENERAL", "PerformanceMode"), Some(true));
        std::fs::write(&path, "[GENERAL]\nPerformanceMode = false\n").unwrap();
        assert_eq!(cache.load(&path).get::<bool>("GENERAL", "PerformanceMode"), Some(true));
        cache.invalidate(&path);
        assert_eq!(cache.load(&path).get::<bool>("GENERAL", "PerformanceMode"), Some(false));
    }

    #[test]
    fn unparsable_file_is_never_overwritten() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("runtime.ini");
        let original = "[GENERAL\nPreprocessorDefinitions = [\"QUALITY=3\"]\n";
        std::fs::write(&path, original).unwrap();

        let mut cache = ConfigCache::new();
        let config = cache.load(&path);
        assert!(config.is_read_only());
        assert_eq!(config.get::<Vec<String>>("GENERAL", "PreprocessorDefinitions"), None);
        config.set("GENERAL", "CurrentPresetPath", "Night.ini").unwrap();

        assert_eq!(cache.flush().unwrap(), 0);
        assert!(!cache.flush_path(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
        assert!(!cache.load(&path).is_modified());

        std::fs::write(&path, "[GENERAL]\nPerformanceMode = true\n").unwrap();
        cache.invalidate(&path);
        assert!(!cache.load(&path).is_read_only());
    }

    #[test]
    fn flush_path_reports_uncached() {
        let mut cache = ConfigCache::new();
        assert!(!cache.flush_path(Path::new("never-loaded.ini")).unwrap());
    }
}
