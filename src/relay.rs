use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::AsyncWrite;

use crate::config::SyncOptions;
use crate::encoder::ChangeEncoder;
use crate::error::{EventError, SetupError};
use crate::integration::Integration;
use crate::output::{WatchSummary, print_watch_summary};
use crate::placeholder::PlaceholderTracker;
use crate::protocol::FrameWriter;
use crate::watcher::event::WatchEvent;
use crate::watcher::{WatchRegistrar, WatchSource, start_watcher};

/// Run the sending side until the integration exits or the process is interrupted.
///
/// Startup order: validate options, launch the integration and wait for it, register
/// every directory, recover placeholder state, print the summary. Any failure up to
/// that point aborts. After it, events are handled one at a time in arrival order and
/// a failing event is logged and dropped.
pub async fn run(options: SyncOptions, json: bool) -> Result<()> {
    let options = options.validate()?;
    let program = options.integration.clone().ok_or(SetupError::NoIntegration)?;

    let Integration { mut child, stdin } = Integration::launch(
        &program,
        &options.integration_args,
        Duration::from_secs(options.ready_timeout_secs),
    )
    .await?;

    let (mut watcher, mut events) = start_watcher()?;
    watcher.registrar.register(&options.targets)?;

    let tracker = if options.use_placeholders {
        PlaceholderTracker::recover(&options.targets)?
    } else {
        PlaceholderTracker::new()
    };
    if !tracker.is_empty() {
        tracing::info!(count = tracker.len(), "recovered placeholders from a previous run");
    }

    let mut encoder =
        ChangeEncoder::new(&options, tracker).context("watch targets must be UTF-8 paths")?;
    let mut writer = FrameWriter::new(stdin);

    print_watch_summary(
        &WatchSummary {
            targets: options.targets.len(),
            directories: watcher.registrar.watched_count(),
            placeholders: encoder.tracker().len(),
        },
        json,
    );

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("event source stopped");
                };
                if let Err(err) =
                    handle_event(&event, &mut watcher.registrar, &mut encoder, &mut writer).await
                {
                    tracing::error!(path = %event.path().display(), error = %err, "dropping event");
                }
            }
            status = child.wait() => {
                let status = status.context("failed to wait for integration")?;
                bail!("integration exited ({status})");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                return Ok(());
            }
        }
    }
}

/// Handle one event: register new directories, forget removed ones, otherwise encode,
/// write and commit. Returns the number of frames written.
pub async fn handle_event<S: WatchSource, W: AsyncWrite + Unpin>(
    event: &WatchEvent,
    registrar: &mut WatchRegistrar<S>,
    encoder: &mut ChangeEncoder,
    writer: &mut FrameWriter<W>,
) -> Result<usize, EventError> {
    match event {
        WatchEvent::Changed(path) if path.is_dir() => {
            if !registrar.is_watched(path) {
                let added = registrar.register_tree(path)?;
                tracing::debug!(path = %path.display(), added, "registered new directory");
            }
            return Ok(0);
        }
        WatchEvent::Removed(path) if registrar.forget(path) => {
            tracing::debug!(path = %path.display(), "directory removed");
            return Ok(0);
        }
        _ => {}
    }

    let messages = encoder.encode(event)?;
    if messages.is_empty() {
        return Ok(0);
    }
    writer.write_frames(&messages).await?;
    encoder.commit(event)?;

    tracing::debug!(path = %event.path().display(), chunks = messages.len(), "relayed");
    Ok(messages.len())
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::protocol::DESTINATIONS_ARG;
    use crate::receiver::MessageReceiver;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[derive(Default)]
    struct NullSource;

    impl WatchSource for NullSource {
        fn watch_dir(&mut self, _dir: &Path) -> notify::Result<()> {
            Ok(())
        }
    }

    /// Sender and receiver wired back to back through an in-memory pipe.
    struct Harness {
        _tmp: tempfile::TempDir,
        base: PathBuf,
        dest: PathBuf,
        registrar: WatchRegistrar<NullSource>,
        encoder: ChangeEncoder,
        writer: FrameWriter<Vec<u8>>,
        receiver: MessageReceiver,
    }

    impl Harness {
        fn new(roots: &[&str], max_chunk_bytes: usize, use_placeholders: bool) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let base = tmp.path().canonicalize().unwrap();
            let dest = base.join("dest");
            std::fs::create_dir(&dest).unwrap();

            let targets: Vec<PathBuf> = roots.iter().map(|r| base.join(r)).collect();
            for target in &targets {
                std::fs::create_dir_all(target).unwrap();
            }
            let mut options = SyncOptions {
                integration: Some(PathBuf::from("unused")),
                targets: targets.clone(),
                max_chunk_bytes,
                use_placeholders,
                ..SyncOptions::default()
            };
            options
                .arguments
                .insert(DESTINATIONS_ARG.to_owned(), dest.display().to_string());

            let mut registrar = WatchRegistrar::new(NullSource);
            registrar.register(&targets).unwrap();

            Self {
                _tmp: tmp,
                base,
                dest,
                registrar,
                encoder: ChangeEncoder::new(&options, PlaceholderTracker::new()).unwrap(),
                writer: FrameWriter::new(Vec::new()),
                receiver: MessageReceiver::new(),
            }
        }

        /// Push one event through the sender, then deliver everything written so far.
        async fn relay(&mut self, event: WatchEvent) -> usize {
            let frames = handle_event(
                &event,
                &mut self.registrar,
                &mut self.encoder,
                &mut self.writer,
            )
            .await
            .unwrap();
            let wire = std::mem::take(self.writer.get_mut());
            self.receiver.run(wire.as_slice()).await.unwrap();
            frames
        }
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(63)]
    #[case(64)]
    #[case(65)]
    #[case(640)]
    #[tokio::test]
    async fn test_round_trip_sizes(#[case] size: usize) {
        let mut h = Harness::new(&["alpha"], 64, false);
        let path = h.base.join("alpha/blob");
        let bytes: Vec<u8> = (0..size).map(|i| (i % 256) as u8).rev().collect();
        std::fs::write(&path, &bytes).unwrap();

        let frames = h.relay(WatchEvent::Changed(path)).await;

        assert_eq!(frames, size.div_ceil(64).max(1));
        assert_eq!(std::fs::read(h.dest.join("blob")).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_plain_remove_deletes_destination() {
        let mut h = Harness::new(&["alpha"], 64, false);
        let path = h.base.join("alpha/one");
        std::fs::write(&path, b"asdf").unwrap();
        h.relay(WatchEvent::Changed(path.clone())).await;
        assert!(h.dest.join("one").exists());

        std::fs::remove_file(&path).unwrap();
        assert_eq!(h.relay(WatchEvent::Removed(path)).await, 1);
        assert!(!h.dest.join("one").exists());
    }

    #[tokio::test]
    async fn test_placeholder_scenario() {
        let mut h = Harness::new(&["alpha"], 64, true);
        let original = h.base.join("alpha/one");
        let stub = h.base.join("alpha/one.placeholder");
        std::fs::write(&original, b"asdf").unwrap();

        h.relay(WatchEvent::Changed(original.clone())).await;
        assert_eq!(std::fs::read(h.dest.join("one")).unwrap(), b"asdf");
        assert!(!original.exists());
        assert!(stub.exists());

        // events caused by the swap itself
        assert_eq!(h.relay(WatchEvent::Removed(original.clone())).await, 0);
        assert_eq!(h.relay(WatchEvent::Changed(stub.clone())).await, 0);
        assert!(h.dest.join("one").exists());

        std::fs::remove_file(&stub).unwrap();
        assert_eq!(h.relay(WatchEvent::Removed(stub)).await, 1);
        assert!(!h.dest.join("one").exists());
    }

    #[tokio::test]
    async fn test_two_roots_never_collide() {
        let mut h = Harness::new(&["alpha", "beta"], 64, false);
        let one = h.base.join("alpha/one");
        let two = h.base.join("beta/two");
        let clash_a = h.base.join("alpha/same");
        let clash_b = h.base.join("beta/same");
        std::fs::write(&one, b"1").unwrap();
        std::fs::write(&two, b"2").unwrap();
        std::fs::write(&clash_a, b"from alpha").unwrap();
        std::fs::write(&clash_b, b"from beta").unwrap();

        for path in [one, two, clash_a, clash_b] {
            h.relay(WatchEvent::Changed(path)).await;
        }

        assert!(h.dest.join("alpha/one").exists());
        assert!(h.dest.join("beta/two").exists());
        assert_eq!(std::fs::read(h.dest.join("alpha/same")).unwrap(), b"from alpha");
        assert_eq!(std::fs::read(h.dest.join("beta/same")).unwrap(), b"from beta");
    }

    #[tokio::test]
    async fn test_new_directory_registered_not_relayed() {
        let mut h = Harness::new(&["alpha"], 64, false);
        let sub = h.base.join("alpha/sub1/sub2");
        std::fs::create_dir_all(&sub).unwrap();

        let frames = h
            .relay(WatchEvent::Changed(h.base.join("alpha/sub1")))
            .await;
        assert_eq!(frames, 0);
        assert!(h.registrar.is_watched(&sub));

        let file = sub.join("two");
        std::fs::write(&file, b"deep").unwrap();
        h.relay(WatchEvent::Changed(file)).await;
        assert_eq!(std::fs::read(h.dest.join("sub1/sub2/two")).unwrap(), b"deep");

        std::fs::remove_dir_all(h.base.join("alpha/sub1")).unwrap();
        let frames = h
            .relay(WatchEvent::Removed(h.base.join("alpha/sub1")))
            .await;
        assert_eq!(frames, 0);
        assert!(!h.registrar.is_watched(&sub));
    }

    #[tokio::test]
    async fn test_bad_event_does_not_stop_the_next() {
        let mut h = Harness::new(&["alpha"], 64, false);
        let ghost = WatchEvent::Changed(h.base.join("alpha/ghost"));
        let err = handle_event(&ghost, &mut h.registrar, &mut h.encoder, &mut h.writer).await;
        assert!(err.is_err());
        assert!(h.writer.get_mut().is_empty());

        let real = h.base.join("alpha/real");
        std::fs::write(&real, b"ok").unwrap();
        h.relay(WatchEvent::Changed(real)).await;
        assert_eq!(std::fs::read(h.dest.join("real")).unwrap(), b"ok");
    }
}
