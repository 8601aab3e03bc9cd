//! In-process fake connector for controller tests
//!
//! [`FakeConnector::new`] returns a `(FakeConnector, FakeConnectorHandle)`
//! pair. Wire the connector into the code under test; every exchange it
//! opens shows up on the handle as a [`FakeStream`], through which the test
//! plays the server side:
//!
//! ```text
//! controller open() --> FakeConnector --> handle.next_stream() -> FakeStream
//! FakeStream::emit() -----------------------------------------> StreamSession
//! ```

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StreamChatError;
use crate::stream::sse::{FrameResult, SseFrame};
use crate::stream::{StreamConnector, StreamRequest, StreamSession};

/// Connector that hands every opened exchange to the test
#[derive(Debug)]
pub struct FakeConnector {
    opened: mpsc::UnboundedSender<FakeStream>,
}

/// Test side of a [`FakeConnector`]
#[derive(Debug)]
pub struct FakeConnectorHandle {
    opened: mpsc::UnboundedReceiver<FakeStream>,
}

impl FakeConnector {
    /// Creates a connector and its handle
    pub fn new() -> (Self, FakeConnectorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { opened: tx }, FakeConnectorHandle { opened: rx })
    }
}

impl StreamConnector for FakeConnector {
    fn open(&self, request: StreamRequest) -> StreamSession {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let opened_with_session = request.session_id.is_some();
        let _ = self.opened.send(FakeStream {
            request,
            frames: frames_tx,
            cancel: cancel.clone(),
        });
        StreamSession::new(frames_rx, cancel, opened_with_session)
    }
}

impl FakeConnectorHandle {
    /// Takes the next exchange opened since the last call, if any
    pub fn next_stream(&mut self) -> Option<FakeStream> {
        self.opened.try_recv().ok()
    }

    /// Waits for the next exchange to be opened
    pub async fn wait_stream(&mut self) -> Option<FakeStream> {
        self.opened.recv().await
    }
}

/// Server side of one fake exchange
#[derive(Debug)]
pub struct FakeStream {
    /// Request the controller opened the exchange with
    pub request: StreamRequest,
    frames: mpsc::UnboundedSender<FrameResult>,
    cancel: CancellationToken,
}

impl FakeStream {
    /// Sends a named event with a JSON payload
    ///
    /// Returns false once the receiving session has been closed.
    pub fn emit(&self, event: &str, payload: serde_json::Value) -> bool {
        self.emit_raw(event, &payload.to_string())
    }

    /// Sends a named event with an arbitrary data string
    pub fn emit_raw(&self, event: &str, data: &str) -> bool {
        self.frames.send(Ok(SseFrame::new(event, data))).is_ok()
    }

    /// Simulates the connection dropping with a read error
    pub fn fail_transport(&self, message: &str) -> bool {
        self.frames
            .send(Err(StreamChatError::Transport(message.to_string())))
            .is_ok()
    }

    /// Ends the body without a terminal event
    pub fn end(self) {}

    /// Returns true once the controller tore the exchange down
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
