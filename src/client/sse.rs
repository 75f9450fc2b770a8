//! Server-sent event framing for the `/events/stream` feed.
//!
//! Bytes are buffered until a full line is available. `data:` lines are
//! accumulated and dispatched as one message when a blank line ends the
//! event. Comments (`:` lines, used for keep-alives) and the `event:`, `id:`
//! and `retry:` fields are ignored; every payload carries its own type.

use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::warn;

/// Turn a chunked byte stream into a stream of SSE `data` payloads.
///
/// A read error ends the stream; reconnecting is the caller's job. Data left
/// without a terminating blank line when the body ends is still emitted.
pub fn sse_messages<S, E>(byte_stream: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display + Send,
{
    futures::stream::unfold(
        Framer {
            stream: byte_stream,
            buffer: BytesMut::with_capacity(8192),
            data: Vec::new(),
            done: false,
        },
        |mut framer| async move {
            let message = framer.next_message().await?;
            Some((message, framer))
        },
    )
}

struct Framer<S> {
    stream: S,
    buffer: BytesMut,
    data: Vec<String>,
    done: bool,
}

impl<S, E> Framer<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    async fn next_message(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line = self.buffer.split_to(pos + 1);
                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                let Ok(line) = std::str::from_utf8(&line) else {
                    continue;
                };
                if let Some(message) = self.feed_line(line) {
                    return Some(message);
                }
                continue;
            }

            if self.done {
                return None;
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    warn!("Event stream read error: {e}");
                    self.done = true;
                    self.buffer.clear();
                    return self.flush();
                }
                None => {
                    self.done = true;
                    if !self.buffer.is_empty() {
                        let rest = self.buffer.split();
                        if let Ok(line) = std::str::from_utf8(&rest) {
                            self.feed_line(line.trim_end_matches('\r'));
                        }
                    }
                    return self.flush();
                }
            }
        }
    }

    /// Process one line; returns a finished message on a blank line.
    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.flush();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn flush(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let message = self.data.join("\n");
        self.data.clear();
        (!message.trim().is_empty()).then_some(message)
    }
}
