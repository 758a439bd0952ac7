use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::SetupError;

/// Suffix appended to an evicted file's name to form its stub.
pub const PLACEHOLDER_SUFFIX: &str = ".placeholder";

/// True if `name` ends with the placeholder suffix (a true suffix, not a substring:
/// `one.placeholder.one` is not a stub).
pub fn is_placeholder_name(name: &str) -> bool {
    match name.rfind(PLACEHOLDER_SUFFIX) {
        Some(idx) => idx + PLACEHOLDER_SUFFIX.len() == name.len(),
        None => false,
    }
}

/// Strip the placeholder suffix from a stub name, or return the name unchanged.
pub fn strip_placeholder(name: &str) -> &str {
    if is_placeholder_name(name) {
        &name[..name.len() - PLACEHOLDER_SUFFIX.len()]
    } else {
        name
    }
}

pub fn is_placeholder_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(is_placeholder_name)
}

/// `dir/name` → `dir/name.placeholder`.
pub fn stub_path(original: &Path) -> PathBuf {
    let mut name = original
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(PLACEHOLDER_SUFFIX);
    original.with_file_name(name)
}

/// `dir/name.placeholder` → `dir/name`. `None` if `stub` is not a stub.
pub fn original_path(stub: &Path) -> Option<PathBuf> {
    let name = stub.file_name()?.to_str()?;
    if !is_placeholder_name(name) {
        return None;
    }
    Some(stub.with_file_name(strip_placeholder(name)))
}

/// Source paths that have been synced and swapped for a stub.
///
/// Lives for the process lifetime and is owned by the encoder; the only mutations
/// are `hold` after a swap and `release` when the stub itself is deleted.
#[derive(Debug, Default)]
pub struct PlaceholderTracker {
    held: HashSet<PathBuf>,
}

impl PlaceholderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state from stubs already on disk under `roots`.
    ///
    /// A stub whose original sibling is missing means the original was evicted by an
    /// earlier run. A stub next to an existing original is left alone; the original
    /// will be synced and swapped again on its next change.
    pub fn recover(roots: &[PathBuf]) -> Result<Self, SetupError> {
        let mut tracker = Self::new();
        for root in roots {
            let walker = ignore::WalkBuilder::new(root)
                .standard_filters(false)
                .build();
            for entry in walker {
                let entry = entry.map_err(|source| SetupError::Walk {
                    path: root.clone(),
                    source,
                })?;
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    continue;
                }
                if let Some(original) = original_path(entry.path())
                    && !original.exists()
                {
                    tracker.hold(original);
                }
            }
        }
        Ok(tracker)
    }

    pub fn hold(&mut self, original: PathBuf) {
        self.held.insert(original);
    }

    pub fn is_held(&self, original: &Path) -> bool {
        self.held.contains(original)
    }

    /// Returns whether the path was held.
    pub fn release(&mut self, original: &Path) -> bool {
        self.held.remove(original)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}
