use std::path::{Path, PathBuf};

/// A filesystem change after classification. The debouncer cannot tell a creation
/// from a modification, so both arrive as `Changed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The path exists: it was created or its contents changed.
    Changed(PathBuf),
    /// The path no longer exists.
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Changed(path) | Self::Removed(path) => path,
        }
    }
}
