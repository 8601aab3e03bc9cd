//! Server-sent events framing
//!
//! Splits a raw response body into SSE frames. Frames are separated by a
//! blank line; each carries optional `event:` and `id:` fields and one or
//! more `data:` lines. Comments (`:` lines), `retry:` fields, frames without
//! data and `event: ping` keep-alives are dropped here so the decoder above
//! only sees frames that mean something.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StreamChatError;

/// One dispatched SSE frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// Event name; `None` means the default `message` event
    pub event: Option<String>,
    /// Data lines joined with `\n`
    pub data: String,
    /// Last `id:` value seen in the frame
    pub id: Option<String>,
}

impl SseFrame {
    /// Convenience constructor for a named event
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            id: None,
        }
    }

    /// Event name with the SSE default applied
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Item flowing from the connection reader to the stream session
pub type FrameResult = std::result::Result<SseFrame, StreamChatError>;

/// Incremental SSE parser
///
/// Bytes are buffered until a full frame is available, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Creates an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(pos) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&block[..pos]);
            if let Some(frame) = parse_block(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame that was not followed by a blank line
    pub fn finish(&mut self) -> Option<SseFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let block = std::mem::take(&mut self.buffer);
        parse_block(&String::from_utf8_lossy(&block))
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Parses one frame block (the text between two blank lines)
///
/// Returns `None` for blocks that must not be dispatched.
pub fn parse_block(block: &str) -> Option<SseFrame> {
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event: Option<&str> = None;
    let mut id: Option<&str> = None;

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "event" => event = Some(value.trim()),
            "id" => id = Some(value.trim()),
            // retry: reconnect timing is not used, streams are never resumed
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    if event.map(|e| e.eq_ignore_ascii_case("ping")).unwrap_or(false) {
        return None;
    }

    Some(SseFrame {
        event: event.filter(|e| !e.is_empty()).map(str::to_string),
        data: data_lines.join("\n"),
        id: id.map(str::to_string),
    })
}

/// Reads `byte_stream` until it ends, fails or `cancel` fires, forwarding
/// complete frames to `frames`
///
/// A read error is forwarded as a transport error and ends the pump. A
/// clean end of stream simply drops the sender; the receiving session
/// decides whether that was premature.
pub async fn forward_sse_frames<S, E>(
    byte_stream: S,
    frames: mpsc::UnboundedSender<FrameResult>,
    cancel: CancellationToken,
) where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut parser = SseParser::new();
    tokio::pin!(byte_stream);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("SSE reader cancelled");
                return;
            }
            next = byte_stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                for frame in parser.push(&chunk) {
                    if frames.send(Ok(frame)).is_err() {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                let _ = frames.send(Err(StreamChatError::Transport(format!(
                    "stream interrupted: {}",
                    e
                ))));
                return;
            }
            None => break,
        }
    }

    if let Some(frame) = parser.finish() {
        let _ = frames.send(Ok(frame));
    }
}
