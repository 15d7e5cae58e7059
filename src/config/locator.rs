//! Configuration file discovery.
//!
//! The environment override always wins. Without it the file is searched for
//! relative to the running executable using a layout convention:
//!
//! ```text
//! <root>/apiclient.config
//! <root>/<project>/bin/<profile>/      base dir of a built binary   (3 levels up)
//! <root>/<site>/                       base dir of a hosted service (1 level up)
//! ```
//!
//! The heuristic is best-effort and depends on how the application is laid
//! out on disk. Deployments should prefer `APICLIENT_CONFIG_PATH`.

use super::{BUILD_OUTPUT_MARKER, CONFIG_FILE_NAME, CONFIG_PATH_ENV};
use crate::error::{ConfigError, ConfigResult};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Levels walked up from a build-output base directory.
pub const BUILD_OUTPUT_LEVELS: usize = 3;

/// Levels walked up from any other base directory.
pub const HOSTED_LEVELS: usize = 1;

/// Where the configuration file is looked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocator {
    /// Path taken verbatim from `APICLIENT_CONFIG_PATH`.
    Override(PathBuf),
    /// Upward search starting at the executable's directory.
    Search { base_dir: PathBuf },
}

impl ConfigLocator {
    /// Builds a locator from the process environment.
    ///
    /// The executable's directory is only looked up when no override is set.
    pub fn from_env() -> ConfigResult<Self> {
        match std::env::var_os(CONFIG_PATH_ENV).filter(|value| !value.is_empty()) {
            Some(value) => Ok(Self::Override(PathBuf::from(value))),
            None => Ok(Self::Search {
                base_dir: executable_dir()?,
            }),
        }
    }

    /// Resolves the configuration file path against the real filesystem.
    pub fn locate(&self) -> ConfigResult<PathBuf> {
        self.locate_with(Path::is_file)
    }

    /// Resolves the configuration file path using `exists` to check the
    /// candidate file.
    pub fn locate_with<F>(&self, exists: F) -> ConfigResult<PathBuf>
    where
        F: Fn(&Path) -> bool,
    {
        let candidate = match self {
            Self::Override(path) => path.clone(),
            Self::Search { base_dir } => search_root(base_dir)?.join(CONFIG_FILE_NAME),
        };

        if !exists(&candidate) {
            return Err(ConfigError::ConfigurationNotFound { path: candidate });
        }

        let source = match self {
            Self::Override(_) => "env",
            Self::Search { .. } => "search",
        };
        info!(path = %candidate.display(), source, "Resolved configuration file");
        Ok(candidate)
    }
}

/// Directory expected to hold the configuration file for a given base
/// directory.
///
/// Base directories under a `bin` segment are treated as build output and
/// walk [`BUILD_OUTPUT_LEVELS`] up; everything else walks [`HOSTED_LEVELS`].
pub fn search_root(base_dir: &Path) -> ConfigResult<PathBuf> {
    let levels = if is_build_output(base_dir) {
        BUILD_OUTPUT_LEVELS
    } else {
        HOSTED_LEVELS
    };

    debug!(base_dir = %base_dir.display(), levels, "Searching for configuration root");

    base_dir
        .ancestors()
        .nth(levels)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| ConfigError::SearchRootUnavailable {
            base_dir: base_dir.to_path_buf(),
            levels,
        })
}

/// True when a `bin` segment appears before the last component.
pub fn is_build_output(base_dir: &Path) -> bool {
    base_dir
        .components()
        .rev()
        .skip(1)
        .any(|component| component.as_os_str() == BUILD_OUTPUT_MARKER)
}

fn executable_dir() -> ConfigResult<PathBuf> {
    let exe = std::env::current_exe().map_err(ConfigError::BaseDirectoryUnavailable)?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            ConfigError::BaseDirectoryUnavailable(io::Error::new(
                io::ErrorKind::NotFound,
                format!("executable {} has no parent directory", exe.display()),
            ))
        })
}
