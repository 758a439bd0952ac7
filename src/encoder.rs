use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::SyncOptions;
use crate::error::EventError;
use crate::placeholder::{self, PlaceholderTracker};
use crate::protocol::ChangeMessage;
use crate::resolver::resolve_suffix;
use crate::watcher::event::WatchEvent;

/// Turns watch events into ordered frames.
///
/// Encoding is split from its side effects: `encode` only reads, and `commit` applies
/// the placeholder bookkeeping once the frames have been written. A failed write
/// therefore never evicts a file that did not reach the integration.
pub struct ChangeEncoder {
    roots: Vec<String>,
    arguments: BTreeMap<String, String>,
    max_chunk_bytes: usize,
    use_placeholders: bool,
    remove_deleted_files: bool,
    tracker: PlaceholderTracker,
}

impl ChangeEncoder {
    /// `options` must already be validated (canonical UTF-8 targets, non-zero chunk size).
    pub fn new(options: &SyncOptions, tracker: PlaceholderTracker) -> Result<Self, EventError> {
        let roots = options
            .targets
            .iter()
            .map(|t| path_str(t).map(str::to_owned))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            roots,
            arguments: options.arguments.clone(),
            max_chunk_bytes: options.max_chunk_bytes.max(1),
            use_placeholders: options.use_placeholders,
            remove_deleted_files: options.remove_deleted_files,
            tracker,
        })
    }

    pub fn tracker(&self) -> &PlaceholderTracker {
        &self.tracker
    }

    /// Build the frames for one event. An empty result means the event is not synced.
    pub fn encode(&self, event: &WatchEvent) -> Result<Vec<ChangeMessage>, EventError> {
        match event {
            WatchEvent::Removed(path) => self.encode_remove(path),
            WatchEvent::Changed(path) => self.encode_change(path),
        }
    }

    fn encode_remove(&self, path: &Path) -> Result<Vec<ChangeMessage>, EventError> {
        if self.use_placeholders {
            // The original vanished because we swapped it for a stub.
            if self.tracker.is_held(path) {
                tracing::debug!(path = %path.display(), "ignoring remove caused by placeholder swap");
                return Ok(Vec::new());
            }
            if placeholder::is_placeholder_path(path) {
                let (dir, name) = split(path)?;
                let name = placeholder::strip_placeholder(name);
                return Ok(vec![ChangeMessage::remove(
                    name,
                    &self.destination_dir(dir)?,
                    &self.arguments,
                )]);
            }
        }

        if !self.remove_deleted_files {
            return Ok(Vec::new());
        }

        let (dir, name) = split(path)?;
        Ok(vec![ChangeMessage::remove(
            name,
            &self.destination_dir(dir)?,
            &self.arguments,
        )])
    }

    fn encode_change(&self, path: &Path) -> Result<Vec<ChangeMessage>, EventError> {
        if self.use_placeholders && placeholder::is_placeholder_path(path) {
            return Ok(Vec::new());
        }

        let (dir, name) = split(path)?;
        let dest_dir = self.destination_dir(dir)?;
        let bytes = std::fs::read(path).map_err(|e| EventError::io(path, e))?;

        Ok(self.chunk(name, &dest_dir, &bytes))
    }

    /// Slice `bytes` into frames of at most `max_chunk_bytes` each. An empty file is a
    /// single empty frame; otherwise every frame carries at least one byte.
    fn chunk(&self, name: &str, dest_dir: &str, bytes: &[u8]) -> Vec<ChangeMessage> {
        if bytes.is_empty() {
            return vec![ChangeMessage::chunk(name, dest_dir, &self.arguments, &[], true)];
        }
        let count = bytes.len().div_ceil(self.max_chunk_bytes);
        bytes
            .chunks(self.max_chunk_bytes)
            .enumerate()
            .map(|(i, chunk)| {
                ChangeMessage::chunk(name, dest_dir, &self.arguments, chunk, i + 1 == count)
            })
            .collect()
    }

    /// Apply the side effects of an event whose frames were written successfully.
    pub fn commit(&mut self, event: &WatchEvent) -> Result<(), EventError> {
        if !self.use_placeholders {
            return Ok(());
        }
        match event {
            WatchEvent::Removed(path) => {
                if let Some(original) = placeholder::original_path(path)
                    && self.tracker.release(&original)
                {
                    tracing::debug!(path = %original.display(), "placeholder released");
                }
                Ok(())
            }
            WatchEvent::Changed(path) => {
                if placeholder::is_placeholder_path(path) {
                    return Ok(());
                }
                self.swap_for_placeholder(path)
            }
        }
    }

    fn swap_for_placeholder(&mut self, path: &Path) -> Result<(), EventError> {
        tracing::debug!(path = %path.display(), "swapping for placeholder");
        self.tracker.hold(path.to_path_buf());
        std::fs::remove_file(path).map_err(|e| EventError::io(path, e))?;
        let stub = placeholder::stub_path(path);
        std::fs::File::create(&stub).map_err(|e| EventError::io(&stub, e))?;
        Ok(())
    }

    fn destination_dir(&self, dir: &Path) -> Result<String, EventError> {
        Ok(resolve_suffix(&self.roots, path_str(dir)?))
    }
}

fn path_str(path: &Path) -> Result<&str, EventError> {
    path.to_str().ok_or_else(|| EventError::NonUtf8Path {
        path: PathBuf::from(path),
    })
}

/// Split an event path into its parent directory and base name.
fn split(path: &Path) -> Result<(&Path, &str), EventError> {
    let non_utf8 = || EventError::NonUtf8Path {
        path: path.to_path_buf(),
    };
    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(non_utf8)?;
    let dir = path.parent().ok_or_else(non_utf8)?;
    Ok((dir, name))
}
