use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::FrameError;
use crate::protocol::{ChangeMessage, ChangeType, READY_SIGNAL, parse_frame};

/// A transfer is keyed by its destination-relative directory and file name.
type TransferKey = (String, String);

/// What applying one frame did.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A non-final chunk was buffered.
    Buffered,
    /// A chunk arrived for a transfer that already failed; it was dropped.
    Discarded,
    /// The final chunk arrived; the file was written at these paths.
    Written(Vec<PathBuf>),
    /// The file was removed at these paths.
    Removed(Vec<PathBuf>),
}

/// Counters reported when the input stream ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveStats {
    pub frames: usize,
    pub written: usize,
    pub removed: usize,
    pub skipped: usize,
}

/// Applies frames from the integration pipe to every configured destination.
///
/// Chunks accumulate per (path, name) until the final one, which triggers an atomic
/// write of the reassembled bytes. A transfer whose chunk fails to decode is poisoned:
/// its remaining chunks are dropped rather than producing a truncated file.
#[derive(Debug, Default)]
pub struct MessageReceiver {
    pending: HashMap<TransferKey, Vec<u8>>,
    poisoned: HashSet<TransferKey>,
}

impl MessageReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume frames until the input ends. Bad frames are reported and skipped; only a
    /// failure to read the input itself ends the loop early.
    pub async fn run<R: AsyncBufRead + Unpin>(
        &mut self,
        mut input: R,
    ) -> std::io::Result<ReceiveStats> {
        let mut stats = ReceiveStats::default();
        let mut line = Vec::new();

        loop {
            line.clear();
            if input.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            stats.frames += 1;

            match self.handle_line(&line) {
                Ok(FrameOutcome::Written(paths)) => {
                    stats.written += paths.len();
                    for path in paths {
                        tracing::info!(path = %path.display(), "written");
                    }
                }
                Ok(FrameOutcome::Removed(paths)) => {
                    stats.removed += paths.len();
                    for path in paths {
                        tracing::info!(path = %path.display(), "removed");
                    }
                }
                Ok(FrameOutcome::Buffered | FrameOutcome::Discarded) => {}
                Err(err) => {
                    stats.skipped += 1;
                    tracing::error!(error = %err, "skipping frame");
                }
            }
        }

        if !self.pending.is_empty() {
            tracing::warn!(
                count = self.pending.len(),
                "input ended with incomplete transfers; discarding them"
            );
            self.pending.clear();
        }
        Ok(stats)
    }

    pub fn handle_line(&mut self, line: &[u8]) -> Result<FrameOutcome, FrameError> {
        let message = parse_frame(line)?;
        self.handle_frame(message)
    }

    pub fn handle_frame(&mut self, message: ChangeMessage) -> Result<FrameOutcome, FrameError> {
        check_name(&message.name)?;
        let relative = relative_dir(&message.path)?;
        let key = (message.path.clone(), message.name.clone());

        match message.change_type {
            ChangeType::CreateUpdate => {
                if self.poisoned.contains(&key) {
                    if message.last_chunk {
                        self.poisoned.remove(&key);
                    }
                    return Ok(FrameOutcome::Discarded);
                }

                let bytes = match message.decode_contents() {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        self.pending.remove(&key);
                        if !message.last_chunk {
                            self.poisoned.insert(key);
                        }
                        return Err(err);
                    }
                };
                self.pending.entry(key.clone()).or_default().extend(bytes);

                if !message.last_chunk {
                    return Ok(FrameOutcome::Buffered);
                }

                let contents = self.pending.remove(&key).unwrap_or_default();
                let destinations = message.destinations()?;
                Ok(FrameOutcome::Written(write_all_destinations(
                    &destinations,
                    &relative,
                    &message.name,
                    &contents,
                )))
            }
            ChangeType::Remove => {
                // A remove supersedes any transfer of the same file still in flight.
                self.pending.remove(&key);
                self.poisoned.remove(&key);
                let destinations = message.destinations()?;
                Ok(FrameOutcome::Removed(remove_all_destinations(
                    &destinations,
                    &relative,
                    &message.name,
                )))
            }
        }
    }
}

/// Run as an integration: announce readiness on stdout, then apply frames from stdin
/// until it closes.
pub async fn serve_stdio() -> std::io::Result<ReceiveStats> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{READY_SIGNAL}\n").as_bytes()).await?;
    stdout.flush().await?;

    MessageReceiver::new()
        .run(BufReader::new(tokio::io::stdin()))
        .await
}

/// Write `contents` under each destination. Failures are reported per destination and
/// do not stop the others.
fn write_all_destinations(
    destinations: &[&str],
    relative: &Path,
    name: &str,
    contents: &[u8],
) -> Vec<PathBuf> {
    let mut written = Vec::new();
    for destination in destinations {
        let dir = Path::new(destination).join(relative);
        let target = dir.join(name);
        match write_atomic(&dir, &target, contents) {
            Ok(()) => written.push(target),
            Err(err) => {
                tracing::error!(path = %target.display(), error = %err, "write failed");
            }
        }
    }
    written
}

/// Atomic write: temp file in the target directory, then rename over the target.
///
/// A replaced file keeps its permissions. A new one gets what a plain create would
/// give it (`0666` minus the umask) rather than the temp file's private `0600`.
fn write_atomic(dir: &Path, target: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = new_temp_file(dir)?;
    tmp.write_all(contents)?;
    if let Ok(existing) = std::fs::metadata(target) {
        tmp.as_file().set_permissions(existing.permissions())?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg_attr(not(unix), allow(unused_mut))]
fn new_temp_file(dir: &Path) -> std::io::Result<tempfile::NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // requested at open, so the umask still applies
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

fn remove_all_destinations(destinations: &[&str], relative: &Path, name: &str) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for destination in destinations {
        let target = Path::new(destination).join(relative).join(name);
        match std::fs::remove_file(&target) {
            Ok(()) => removed.push(target),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %target.display(), "remove: already absent");
            }
            Err(err) => {
                tracing::error!(path = %target.display(), error = %err, "remove failed");
            }
        }
    }
    removed
}

/// The name must be exactly one normal path component.
fn check_name(name: &str) -> Result<(), FrameError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains('/') => Ok(()),
        _ => Err(FrameError::UnsafeName {
            name: name.to_owned(),
        }),
    }
}

/// Turn the frame's rooted path into a relative one, refusing anything that climbs.
fn relative_dir(path: &str) -> Result<PathBuf, FrameError> {
    let mut relative = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => relative.push(part),
            Component::ParentDir | Component::Prefix(_) => {
                return Err(FrameError::UnsafePath {
                    path: path.to_owned(),
                });
            }
        }
    }
    Ok(relative)
}
