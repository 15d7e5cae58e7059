pub mod locator;
pub use locator::{is_build_output, search_root, ConfigLocator};

use crate::error::ConfigResult;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Environment variable holding an explicit configuration file path.
pub const CONFIG_PATH_ENV: &str = "APICLIENT_CONFIG_PATH";

/// File name searched for when no override is set.
pub const CONFIG_FILE_NAME: &str = "apiclient.config";

/// Path segment marking a build-output base directory.
pub const BUILD_OUTPUT_MARKER: &str = "bin";

static RESOLVED_PATH: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Resolves the configuration file once per process.
///
/// A successful resolution is cached for the lifetime of the process. A
/// failure is returned to the caller and the next call tries again.
pub fn resolve_config_path() -> ConfigResult<PathBuf> {
    let mut resolved = RESOLVED_PATH.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(path) = resolved.as_ref() {
        return Ok(path.clone());
    }

    let path = ConfigLocator::from_env()?.locate()?;
    *resolved = Some(path.clone());
    Ok(path)
}

/// Forgets the cached path so the next [`resolve_config_path`] resolves again.
pub fn reset_resolved_path() {
    RESOLVED_PATH
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_resolve_uses_env_override_and_caches() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("first.config");
        let second = temp_dir.path().join("second.config");
        fs::write(&first, "<configuration />").unwrap();
        fs::write(&second, "<configuration />").unwrap();

        reset_resolved_path();
        std::env::set_var(CONFIG_PATH_ENV, &first);
        assert_eq!(resolve_config_path().unwrap(), first);

        // Cached: a changed environment is not observed.
        std::env::set_var(CONFIG_PATH_ENV, &second);
        assert_eq!(resolve_config_path().unwrap(), first);

        reset_resolved_path();
        assert_eq!(resolve_config_path().unwrap(), second);

        std::env::remove_var(CONFIG_PATH_ENV);
        reset_resolved_path();
    }

    #[test]
    #[serial]
    fn test_resolve_failure_is_not_cached() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("late.config");

        reset_resolved_path();
        std::env::set_var(CONFIG_PATH_ENV, &path);
        assert!(matches!(
            resolve_config_path(),
            Err(ConfigError::ConfigurationNotFound { .. })
        ));

        fs::write(&path, "<configuration />").unwrap();
        assert_eq!(resolve_config_path().unwrap(), path);

        std::env::remove_var(CONFIG_PATH_ENV);
        reset_resolved_path();
    }
}
