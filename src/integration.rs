use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::SetupError;
use crate::protocol::READY_SIGNAL;

/// A running integration subprocess and the write end of its frame pipe.
pub struct Integration {
    pub child: Child,
    pub stdin: ChildStdin,
}

impl Integration {
    /// Launch the integration and wait for its readiness line.
    ///
    /// stdin carries frames, stdout carries the handshake and is then forwarded to the
    /// log, stderr is inherited. The child is killed when the handle is dropped.
    ///
    /// An integration that exits before signalling is a setup error. One that stays
    /// silent past `ready_timeout` is assumed not to speak the handshake and is used
    /// anyway; the OS pipe buffers frames until it starts reading.
    pub async fn launch(
        program: &Path,
        args: &[String],
        ready_timeout: Duration,
    ) -> Result<Self, SetupError> {
        let spawn_error = |source| SetupError::Spawn {
            path: program.to_path_buf(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdin was not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdout was not captured")))?;
        let mut lines = BufReader::new(stdout).lines();

        match tokio::time::timeout(ready_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) if line.trim() == READY_SIGNAL => {
                tracing::debug!(program = %program.display(), "integration ready");
            }
            Ok(Ok(Some(line))) => {
                tracing::info!(target: "integration", "{line}");
                tracing::warn!("integration did not send a readiness signal; continuing");
            }
            Ok(Ok(None) | Err(_)) => {
                // stdout closed: give the child the same window to finish exiting.
                if let Ok(status) = tokio::time::timeout(ready_timeout, child.wait()).await {
                    let status = status.map_err(spawn_error)?;
                    return Err(SetupError::ExitedBeforeReady {
                        status: status.to_string(),
                    });
                }
                tracing::warn!("integration closed stdout without signalling readiness");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = ready_timeout.as_secs(),
                    "no readiness signal from integration; continuing"
                );
            }
        }

        tokio::spawn(forward_output(lines));

        Ok(Self { child, stdin })
    }
}

/// Relay whatever the integration prints into our own log.
async fn forward_output(mut lines: Lines<BufReader<ChildStdout>>) {
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!(target: "integration", "{line}");
    }
}
