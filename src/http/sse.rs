//! Server-Sent Events framing.
//!
//! SSE is not negotiated here; handlers format frames themselves and return
//! them as a streamed body. Frame layout:
//!
//! ```text
//! event: <name>\n      (only when a name is given)
//! id: <id>\n           (only when an id is given)
//! data: <json>\n\n     (always; the blank line terminates the frame)
//! ```
//!
//! [`channel`] pairs a sender with a [`ResponseBody::Stream`] that ends once
//! every sender has been dropped.

use axum::body::Bytes;
use futures_util::stream;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::dispatch::BoxError;
use crate::http::response::ResponseBody;

/// Frames buffered between a sender and the connection before `send` waits.
const CHANNEL_CAPACITY: usize = 16;

/// Format one SSE frame with a JSON-encoded payload.
///
/// Empty event names and ids are treated as absent.
pub fn server_sent_event<T: Serialize + ?Sized>(
    data: &T,
    event: Option<&str>,
    id: Option<&str>,
) -> Result<String, serde_json::Error> {
    let mut frame = String::new();
    if let Some(event) = event.filter(|e| !e.is_empty()) {
        frame.push_str("event: ");
        frame.push_str(event);
        frame.push('\n');
    }
    if let Some(id) = id.filter(|i| !i.is_empty()) {
        frame.push_str("id: ");
        frame.push_str(id);
        frame.push('\n');
    }
    frame.push_str("data: ");
    frame.push_str(&serde_json::to_string(data)?);
    frame.push_str("\n\n");
    Ok(frame)
}

#[derive(Debug, thiserror::Error)]
pub enum SseError {
    #[error("failed to encode event data: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("event stream closed by the client")]
    Closed,
}

/// Producer half of an SSE stream. Clone to send from several tasks.
#[derive(Debug, Clone)]
pub struct SseSender {
    tx: mpsc::Sender<Bytes>,
}

impl SseSender {
    /// Send one event. Waits while the client is not draining the stream.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        data: &T,
        event: Option<&str>,
        id: Option<&str>,
    ) -> Result<(), SseError> {
        let frame = server_sent_event(data, event, id)?;
        self.send_raw(frame).await
    }

    /// Send an already formatted frame.
    pub async fn send_raw(&self, frame: impl Into<Bytes>) -> Result<(), SseError> {
        self.tx.send(frame.into()).await.map_err(|_| SseError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a sender and the streamed body it feeds.
pub fn channel() -> (SseSender, ResponseBody) {
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    let frames = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok::<_, BoxError>(frame), rx))
    });
    (SseSender { tx }, ResponseBody::stream(frames))
}
