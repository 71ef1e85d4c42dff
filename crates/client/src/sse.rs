//! Server-sent event stream reading.
//!
//! [`SseParser`] turns arbitrary text chunks into frames (chunk boundaries
//! may fall anywhere, including inside a line). [`EventStream`] drives it
//! over an HTTP response and yields typed items.

use std::collections::VecDeque;

use serde::Deserialize;

use assistsync_events::RealtimeEvent;

use crate::transport::TransportError;

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    current: SseFrame,
    has_data: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if line.is_empty() {
                if self.has_data {
                    frames.push(std::mem::take(&mut self.current));
                }
                self.current = SseFrame::default();
                self.has_data = false;
                continue;
            }
            if line.starts_with(':') {
                // keep-alive / comment
                continue;
            }

            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => self.current.event = Some(value.to_string()),
                "id" => self.current.id = Some(value.to_string()),
                "data" => {
                    if self.has_data {
                        self.current.data.push('\n');
                    }
                    self.current.data.push_str(value);
                    self.has_data = true;
                }
                _ => {}
            }
        }

        frames
    }
}

/// Item read from the realtime stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// First frame of a stream; the session id is used to join more rooms.
    Connected { session_id: u64 },
    Event(RealtimeEvent),
}

#[derive(Deserialize)]
struct ConnectedData {
    session_id: u64,
}

impl StreamItem {
    pub fn from_frame(frame: &SseFrame) -> Result<Self, TransportError> {
        match frame.event.as_deref() {
            Some("connected") => {
                let data: ConnectedData =
                    serde_json::from_str(&frame.data).map_err(|e| TransportError::Parse(e.to_string()))?;
                Ok(StreamItem::Connected {
                    session_id: data.session_id,
                })
            }
            _ => serde_json::from_str(&frame.data)
                .map(StreamItem::Event)
                .map_err(|e| TransportError::Parse(e.to_string())),
        }
    }
}

/// Realtime stream over an open HTTP response.
#[derive(Debug)]
pub struct EventStream {
    response: reqwest::Response,
    parser: SseParser,
    ready: VecDeque<SseFrame>,
}

impl EventStream {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            parser: SseParser::new(),
            ready: VecDeque::new(),
        }
    }

    /// Next item, or `None` once the server closes the stream. Frames that
    /// fail to parse are skipped with a warning.
    pub async fn next_item(&mut self) -> Result<Option<StreamItem>, TransportError> {
        loop {
            while let Some(frame) = self.ready.pop_front() {
                match StreamItem::from_frame(&frame) {
                    Ok(item) => return Ok(Some(item)),
                    Err(e) => tracing::warn!(event = ?frame.event, error = %e, "skipping malformed realtime frame"),
                }
            }

            let chunk = self
                .response
                .chunk()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            match chunk {
                Some(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    self.ready.extend(self.parser.feed(&text));
                }
                None => return Ok(None),
            }
        }
    }
}
