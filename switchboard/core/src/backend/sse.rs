//! Server-Sent Event Framing
//!
//! Providers stream completions as `data: <json>` lines separated by blank
//! lines; OpenAI-style providers end with a literal `data: [DONE]` frame.
//! Network reads split frames at arbitrary byte offsets (including inside a
//! multi-byte UTF-8 sequence), so incomplete trailing bytes are held until the
//! next read completes the line.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{AdapterError, StreamEvent};

/// Channel depth between the pump task and the consumer
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// A complete frame extracted from the byte stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseFrame {
    /// Payload of a `data:` line
    Data(String),
    /// The `[DONE]` sentinel
    Done,
}

/// Incremental line buffer for SSE bodies
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes from a network read; returns every frame completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(frame) = parse_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a final line that arrived without a trailing newline
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.pending);
        parse_line(&rest)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseFrame> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);

    // Comments, event names, ids and blank separators carry no payload
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(SseFrame::Done);
    }
    if data.is_empty() {
        return None;
    }
    Some(SseFrame::Data(data.to_string()))
}

/// Per-provider translation of frames into stream events
pub(crate) trait FrameDecoder: Send + 'static {
    /// Translate one frame. A terminal event ends the stream.
    fn decode(&mut self, frame: SseFrame) -> Vec<StreamEvent>;

    /// Event to emit when the body ends before a terminal event
    fn finish(&mut self) -> StreamEvent;
}

/// Spawn a task that reads `response` and forwards decoded events
///
/// The task exits after the first terminal event, when the receiver is
/// dropped (dropping the response aborts the upstream connection), or when
/// no bytes arrive within `idle_timeout`.
pub(crate) fn spawn_event_pump<D: FrameDecoder>(
    response: reqwest::Response,
    mut decoder: D,
    idle_timeout: Duration,
) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        let mut buffer = SseBuffer::new();

        loop {
            let next = tokio::select! {
                () = tx.closed() => {
                    tracing::debug!("Stream consumer went away, aborting upstream read");
                    return;
                }
                next = tokio::time::timeout(idle_timeout, stream.next()) => next,
            };

            let frames = match next {
                Err(_) => {
                    let _ = tx.send(StreamEvent::Error(AdapterError::Timeout)).await;
                    return;
                }
                Ok(Some(Err(e))) => {
                    let _ = tx.send(StreamEvent::Error(e.into())).await;
                    return;
                }
                Ok(Some(Ok(bytes))) => buffer.push(&bytes),
                Ok(None) => {
                    let tail = buffer.finish().into_iter().collect();
                    if forward(&tx, &mut decoder, tail).await {
                        return;
                    }
                    let _ = tx.send(decoder.finish()).await;
                    return;
                }
            };

            if forward(&tx, &mut decoder, frames).await {
                return;
            }
        }
    });

    rx
}

/// Decode and send frames; true when the pump should stop
async fn forward<D: FrameDecoder>(
    tx: &mpsc::Sender<StreamEvent>,
    decoder: &mut D,
    frames: Vec<SseFrame>,
) -> bool {
    for frame in frames {
        for event in decoder.decode(frame) {
            let terminal = event.is_terminal();
            if tx.send(event).await.is_err() || terminal {
                return true;
            }
        }
    }
    false
}
