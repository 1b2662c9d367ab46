use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "FXCTL_CONFIG_DIR";

/// File name of the runtime configuration inside the config directory.
pub const CONFIG_FILE: &str = "runtime.ini";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "ShadeFx";
const APPLICATION: &str = "ShadeFx";

/// Resolves the runtime configuration file: an explicit path wins, then
/// `FXCTL_CONFIG_DIR`, then the platform config directory.
pub fn resolve_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    Ok(config_dir()?.join(CONFIG_FILE))
}

pub fn config_dir() -> Result<PathBuf> {
    if let Some(value) = env_override(ENV_CONFIG_DIR) {
        return Ok(value);
    }
    let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .ok_or_else(|| anyhow!("failed to determine user directories"))?;
    Ok(project_dirs.config_dir().to_path_buf())
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::{Mutex, OnceLock};
    use tempfile::TempDir;

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        key: &'static str,
        previous: Option<OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: impl Into<OsString>) -> Self {
            let previous = env::var_os(key);
            env::set_var(key, value.into());
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = self.previous.take() {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    #[test]
    fn explicit_path_wins_over_env() {
        let _lock = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();
        let _guard = EnvGuard::set(ENV_CONFIG_DIR, root.path());
        let explicit = root.path().join("other.ini");
        assert_eq!(resolve_config_file(Some(&explicit)).unwrap(), explicit);
    }

    #[test]
    fn env_override_names_the_config_directory() {
        let _lock = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();
        let _guard = EnvGuard::set(ENV_CONFIG_DIR, root.path());
        assert_eq!(
            resolve_config_file(None).unwrap(),
            root.path().join(CONFIG_FILE)
        );
    }

    #[test]
    fn empty_env_override_is_ignored() {
        let _lock = env_lock().lock().unwrap();
        let _guard = EnvGuard::set(ENV_CONFIG_DIR, "");
        assert!(env_override(ENV_CONFIG_DIR).is_none());
    }
}
