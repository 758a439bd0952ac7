use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{EventError, FrameError};

use super::ChangeMessage;

/// Writes newline-delimited JSON frames to the integration's stdin.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write every frame of one event, one line at a time, then flush.
    ///
    /// The frames arrive fully encoded, so the file has already been read. Only one
    /// serialised line is held at a time; the line buffer is reused.
    pub async fn write_frames(&mut self, messages: &[ChangeMessage]) -> Result<(), EventError> {
        let mut line = Vec::new();
        for message in messages {
            line.clear();
            serde_json::to_writer(&mut line, message)?;
            line.push(b'\n');
            self.inner.write_all(&line).await.map_err(EventError::Pipe)?;
        }
        self.inner.flush().await.map_err(EventError::Pipe)?;
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

/// Parse one line of the wire protocol. Trailing `\r\n` is whitespace to JSON and is
/// accepted as is; bytes that are not UTF-8 fail like any other malformed frame.
pub fn parse_frame(line: &[u8]) -> Result<ChangeMessage, FrameError> {
    Ok(serde_json::from_slice(line)?)
}
