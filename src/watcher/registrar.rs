use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::Debouncer;

use crate::error::SetupError;

/// Anything that can be asked to report events for one directory (not its children).
pub trait WatchSource {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()>;
}

impl WatchSource for Debouncer<RecommendedWatcher> {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.watcher().watch(dir, RecursiveMode::NonRecursive)
    }
}

/// Registers every directory under the watch roots with the event source, one
/// directory at a time, and remembers what it registered.
pub struct WatchRegistrar<S> {
    source: S,
    watched: HashSet<PathBuf>,
}

impl<S: WatchSource> WatchRegistrar<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            watched: HashSet::new(),
        }
    }

    /// Register each root and all of its descendants.
    ///
    /// Stops at the first directory that cannot be read or watched and returns that
    /// failure. Returns the number of directories newly registered.
    pub fn register(&mut self, roots: &[PathBuf]) -> Result<usize, SetupError> {
        let mut added = 0;
        for root in roots {
            added += self.register_tree(root)?;
        }
        Ok(added)
    }

    /// Depth-first registration of `dir` and everything below it. Directories that are
    /// already registered are skipped.
    pub fn register_tree(&mut self, dir: &Path) -> Result<usize, SetupError> {
        let walker = ignore::WalkBuilder::new(dir)
            .standard_filters(false)
            .build();

        let mut added = 0;
        for entry in walker {
            let entry = entry.map_err(|source| SetupError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                continue;
            }
            let path = entry.path();
            if self.watched.contains(path) {
                continue;
            }
            self.source
                .watch_dir(path)
                .map_err(|source| SetupError::Register {
                    path: path.to_path_buf(),
                    source,
                })?;
            tracing::debug!(path = %path.display(), "watching directory");
            self.watched.insert(path.to_path_buf());
            added += 1;
        }
        Ok(added)
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    /// Drop a removed directory and its descendants. Returns whether `dir` was known.
    ///
    /// The OS drops the underlying watches itself when a directory disappears.
    pub fn forget(&mut self, dir: &Path) -> bool {
        let known = self.watched.remove(dir);
        if known {
            self.watched.retain(|path| !path.starts_with(dir));
        }
        known
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSource {
        seen: Vec<PathBuf>,
        fail_on: Option<PathBuf>,
    }

    impl WatchSource for RecordingSource {
        fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
            if self.fail_on.as_deref() == Some(dir) {
                return Err(notify::Error::generic("refused"));
            }
            self.seen.push(dir.to_path_buf());
            Ok(())
        }
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("alpha/sub1/sub2")).unwrap();
        std::fs::create_dir_all(root.join("beta")).unwrap();
        std::fs::write(root.join("alpha/file"), b"x").unwrap();
        std::fs::write(root.join("alpha/sub1/sub2/deep"), b"x").unwrap();
        dir
    }

    #[test]
    fn test_registers_every_directory_parent_first() {
        let dir = tree();
        let alpha = dir.path().join("alpha");
        let mut registrar = WatchRegistrar::new(RecordingSource::default());

        let added = registrar.register(&[alpha.clone()]).unwrap();

        assert_eq!(added, 3);
        let seen = &registrar.source.seen;
        assert_eq!(seen[0], alpha);
        assert!(seen.contains(&alpha.join("sub1")));
        assert!(seen.contains(&alpha.join("sub1/sub2")));
        let pos = |p: &Path| seen.iter().position(|s| s == p).unwrap();
        assert!(pos(&alpha.join("sub1")) < pos(&alpha.join("sub1/sub2")));
        assert!(!seen.iter().any(|p| p.ends_with("file")));
    }

    #[test]
    fn test_multiple_roots() {
        let dir = tree();
        let mut registrar = WatchRegistrar::new(RecordingSource::default());
        let added = registrar
            .register(&[dir.path().join("alpha"), dir.path().join("beta")])
            .unwrap();
        assert_eq!(added, 4);
        assert_eq!(registrar.watched_count(), 4);
    }

    #[test]
    fn test_new_directory_registered_once() {
        let dir = tree();
        let alpha = dir.path().join("alpha");
        let mut registrar = WatchRegistrar::new(RecordingSource::default());
        registrar.register(&[alpha.clone()]).unwrap();

        std::fs::create_dir_all(alpha.join("fresh/inner")).unwrap();
        assert_eq!(registrar.register_tree(&alpha.join("fresh")).unwrap(), 2);
        assert!(registrar.is_watched(&alpha.join("fresh/inner")));
        assert_eq!(registrar.register_tree(&alpha.join("fresh")).unwrap(), 0);
    }

    #[test]
    fn test_missing_root_aborts() {
        let dir = tree();
        let mut registrar = WatchRegistrar::new(RecordingSource::default());
        let err = registrar
            .register(&[dir.path().join("nope")])
            .unwrap_err();
        assert!(matches!(err, SetupError::Walk { .. }));
    }

    #[test]
    fn test_watch_failure_aborts() {
        let dir = tree();
        let alpha = dir.path().join("alpha");
        let source = RecordingSource {
            seen: Vec::new(),
            fail_on: Some(alpha.join("sub1")),
        };
        let mut registrar = WatchRegistrar::new(source);
        let err = registrar.register(&[alpha]).unwrap_err();
        assert!(matches!(err, SetupError::Register { .. }));
    }

    #[test]
    fn test_forget_drops_descendants() {
        let dir = tree();
        let alpha = dir.path().join("alpha");
        let mut registrar = WatchRegistrar::new(RecordingSource::default());
        registrar.register(&[alpha.clone()]).unwrap();

        assert!(registrar.forget(&alpha.join("sub1")));
        assert!(!registrar.is_watched(&alpha.join("sub1/sub2")));
        assert!(registrar.is_watched(&alpha));
        assert!(!registrar.forget(&alpha.join("file")));
    }
}
