use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SetupError;
use crate::protocol::DESTINATIONS_ARG;

/// Default upper bound on the payload bytes carried by one frame.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 10_000;

/// Default wait for the integration's readiness line.
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 5;

/// Everything the sending side needs, from an optional TOML file and the command line.
///
/// ```toml
/// integration = "/usr/local/bin/mirror-relay"
/// integration-args = ["receive"]
/// targets = ["/home/me/docs", "/home/me/photos"]
/// use-placeholders = true
///
/// [arguments]
/// destinations = "/mnt/backup,/mnt/mirror"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncOptions {
    /// Executable that receives the frames on its stdin.
    pub integration: Option<PathBuf>,
    /// Extra arguments passed to the integration.
    pub integration_args: Vec<String>,
    /// Watch roots.
    pub targets: Vec<PathBuf>,
    /// Opaque pass-through map attached to every frame.
    pub arguments: BTreeMap<String, String>,
    /// Propagate ordinary deletes as `remove` frames.
    pub remove_deleted_files: bool,
    /// Maximum payload bytes per frame. `0` means the default.
    pub max_chunk_bytes: usize,
    /// Swap synced files for empty `.placeholder` stubs.
    pub use_placeholders: bool,
    /// Seconds to wait for the integration's readiness line.
    pub ready_timeout_secs: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            integration: None,
            integration_args: Vec::new(),
            targets: Vec::new(),
            arguments: BTreeMap::new(),
            remove_deleted_files: true,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            use_placeholders: false,
            ready_timeout_secs: DEFAULT_READY_TIMEOUT_SECS,
        }
    }
}

impl SyncOptions {
    /// Load options from a TOML file. Unlike the command line, a broken file is fatal.
    pub fn load(path: &Path) -> Result<Self, SetupError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SetupError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| SetupError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the options and normalise them for the watch loop.
    ///
    /// Targets are canonicalised (absolute, symlinks resolved, no trailing separator) so
    /// that event paths reported by the OS share their prefixes byte for byte.
    pub fn validate(mut self) -> Result<Self, SetupError> {
        if self.integration.is_none() {
            return Err(SetupError::NoIntegration);
        }
        if self.targets.is_empty() {
            return Err(SetupError::NoTargets);
        }
        if self.max_chunk_bytes == 0 {
            self.max_chunk_bytes = DEFAULT_MAX_CHUNK_BYTES;
        }

        let mut targets = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let canonical = target
                .canonicalize()
                .map_err(|source| SetupError::InvalidTarget {
                    path: target.clone(),
                    source,
                })?;
            if !canonical.is_dir() {
                return Err(SetupError::InvalidTarget {
                    path: target.clone(),
                    source: std::io::Error::other("not a directory"),
                });
            }
            if !targets.contains(&canonical) {
                targets.push(canonical);
            }
        }
        self.targets = targets;

        for destination in self.destinations_inside_targets() {
            tracing::warn!(
                destination = %destination.display(),
                "destination lies inside a watch target; writes there will be synced again"
            );
        }

        Ok(self)
    }

    /// Destinations from the `destinations` argument that sit under a watch target.
    fn destinations_inside_targets(&self) -> Vec<PathBuf> {
        let Some(raw) = self.arguments.get(DESTINATIONS_ARG) else {
            return Vec::new();
        };
        raw.split(',')
            .filter(|d| !d.is_empty())
            .map(|d| {
                let path = PathBuf::from(d);
                path.canonicalize().unwrap_or(path)
            })
            .filter(|d| self.targets.iter().any(|t| d.starts_with(t)))
            .collect()
    }
}
