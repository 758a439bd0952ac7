pub mod event;
pub mod registrar;

use std::path::Path;
use std::time::Duration;

use notify::RecommendedWatcher;
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::error::SetupError;

use event::WatchEvent;
pub use registrar::{WatchRegistrar, WatchSource};

/// Debounce window. Short enough to keep the pipe responsive, long enough to fold the
/// create-then-write pair of a fresh file into one event.
const DEBOUNCE: Duration = Duration::from_millis(75);

/// Capacity of the channel between the bridge and the event loop.
const EVENT_BUFFER: usize = 256;

/// Handle to a running event source. The registrar owns the debouncer; dropping the
/// handle stops watching and ends the bridge task.
pub struct WatcherHandle {
    pub registrar: WatchRegistrar<Debouncer<RecommendedWatcher>>,
    /// The bridge task forwarding events from the std channel to the tokio channel.
    _bridge_task: JoinHandle<()>,
}

/// Start a debounced event source with nothing registered yet.
///
/// Returns the handle (whose registrar must be fed the watch roots) and a receiver
/// that yields classified `WatchEvent`s in arrival order.
pub fn start_watcher() -> Result<(WatcherHandle, tokio_mpsc::Receiver<WatchEvent>), SetupError> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();

    let debouncer = new_debouncer(DEBOUNCE, move |res| {
        let _ = std_tx.send(res);
    })
    .map_err(SetupError::EventSource)?;

    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<WatchEvent>(EVENT_BUFFER);

    // Bridge: spawn_blocking to receive from std channel, classify, forward to tokio
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            match result {
                Ok(events) => {
                    for debounced_event in events {
                        let watch_event = classify_event(&debounced_event.path);
                        if tokio_tx.blocking_send(watch_event).is_err() {
                            return; // receiver dropped, shutdown
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "event source error");
                }
            }
        }
    });

    Ok((
        WatcherHandle {
            registrar: WatchRegistrar::new(debouncer),
            _bridge_task: bridge_task,
        },
        tokio_rx,
    ))
}

/// Classify by existence: the debounced event only says "something happened here".
fn classify_event(path: &Path) -> WatchEvent {
    if path.symlink_metadata().is_ok() {
        WatchEvent::Changed(path.to_path_buf())
    } else {
        WatchEvent::Removed(path.to_path_buf())
    }
}
