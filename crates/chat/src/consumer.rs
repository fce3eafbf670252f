use std::collections::VecDeque;

use futures::StreamExt;
use serde::Deserialize;

use docchat_backend::{BackendError, ByteStream};

/// Prefix identifying a payload-bearing frame line.
pub const FRAME_MARKER: &str = "data: ";

/// One decoded frame from the streaming send response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Partial answer text to append to the pending message.
    Token { text: String },
    /// Terminal signal; nothing is decoded after it.
    Complete,
    /// A marker-prefixed line whose JSON payload did not parse.
    Malformed { raw: String },
}

#[derive(Debug, Deserialize)]
struct FramePayload {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    done: bool,
}

/// Incremental frame decoder, independent of any IO source.
///
/// Network chunks are not aligned to frame boundaries, so the decoder
/// keeps the unterminated tail of each chunk in a carry buffer and only
/// processes complete lines. The carry is bytes rather than text: a
/// multi-byte character split across two chunks reassembles before any
/// UTF-8 decoding happens.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    carry: Vec<u8>,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a `Complete` event has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feeds one network chunk, returning the events its complete lines yield.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.carry.extend_from_slice(chunk);

        while !self.finished {
            let Some(newline) = self.carry.iter().position(|byte| *byte == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.carry.drain(..=newline).collect();
            self.process_line(&line[..line.len() - 1], &mut events);
        }

        if self.finished {
            // Everything after the terminal frame is ignored.
            self.carry.clear();
        }

        events
    }

    /// Flushes the trailing fragment and guarantees one terminal event.
    ///
    /// A stream that ends without a `done` frame still terminates the
    /// event sequence with exactly one `Complete`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        let tail = std::mem::take(&mut self.carry);
        if !tail.is_empty() {
            self.process_line(&tail, &mut events);
        }

        if !self.finished {
            events.push(StreamEvent::Complete);
            self.finished = true;
        }

        events
    }

    fn process_line(&mut self, line: &[u8], events: &mut Vec<StreamEvent>) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let line = String::from_utf8_lossy(line);

        let Some(payload) = line.strip_prefix(FRAME_MARKER) else {
            // Heartbeats, comments, anything unframed: not an event.
            return;
        };

        match serde_json::from_str::<FramePayload>(payload) {
            Err(error) => {
                tracing::warn!(%error, raw = %line, "malformed stream frame");
                events.push(StreamEvent::Malformed {
                    raw: line.into_owned(),
                });
            }
            Ok(FramePayload { done: true, .. }) => {
                events.push(StreamEvent::Complete);
                self.finished = true;
            }
            Ok(FramePayload { token: Some(token), .. }) if !token.is_empty() => {
                events.push(StreamEvent::Token { text: token });
            }
            Ok(_) => {}
        }
    }
}

/// Pull-based event sequence over an open response body.
///
/// Events come out strictly in arrival order, one per call, so the
/// dispatcher performs exactly one transcript mutation per event. A
/// transport error surfaces once and terminates the sequence; after the
/// terminal event `next_event` always returns `None`.
pub struct ResponseConsumer {
    source: ByteStream,
    decoder: FrameDecoder,
    queued: VecDeque<StreamEvent>,
    terminated: bool,
}

impl ResponseConsumer {
    pub fn new(source: ByteStream) -> Self {
        Self {
            source,
            decoder: FrameDecoder::new(),
            queued: VecDeque::new(),
            terminated: false,
        }
    }

    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, BackendError>> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                if matches!(event, StreamEvent::Complete) {
                    self.terminated = true;
                    self.queued.clear();
                }
                return Some(Ok(event));
            }

            if self.terminated {
                return None;
            }

            match self.source.next().await {
                Some(Ok(chunk)) => {
                    self.queued.extend(self.decoder.feed(&chunk));
                }
                Some(Err(error)) => {
                    self.terminated = true;
                    return Some(Err(error));
                }
                None => {
                    self.queued.extend(self.decoder.finish());
                    self.terminated = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&[u8]]) -> Vec<StreamEvent> {
        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.feed(chunk));
        }
        events.extend(decoder.finish());
        events
    }

    fn token(text: &str) -> StreamEvent {
        StreamEvent::Token {
            text: text.to_string(),
        }
    }

    #[test]
    fn whole_frames_decode_to_tokens_then_complete() {
        let events = feed_all(&[b"data: {\"token\":\"Hi\"}\ndata: {\"token\":\" there\"}\ndata: {\"done\":true}\n"]);
        assert_eq!(
            events,
            vec![token("Hi"), token(" there"), StreamEvent::Complete],
        );
    }

    #[test]
    fn frame_split_across_chunks_yields_one_event() {
        // Chunk one ends mid-JSON; the naive per-chunk split would corrupt this.
        let events = feed_all(&[b"data: {\"tok", b"en\":\"Hello\"}\ndata: {\"done\":true}\n"]);
        assert_eq!(events, vec![token("Hello"), StreamEvent::Complete]);
    }

    #[test]
    fn multibyte_character_split_across_chunks_survives() {
        let frame = "data: {\"token\":\"caf\u{e9}\"}\n".as_bytes();
        let (left, right) = frame.split_at(frame.len() - 4);

        let events = feed_all(&[left, right]);
        assert_eq!(events, vec![token("caf\u{e9}"), StreamEvent::Complete]);
    }

    #[test]
    fn unmarked_lines_are_discarded_without_events() {
        let events = feed_all(&[b": heartbeat\n\ndata: {\"token\":\"x\"}\n"]);
        assert_eq!(events, vec![token("x"), StreamEvent::Complete]);
    }

    #[test]
    fn malformed_json_is_reported_and_consumption_continues() {
        let events = feed_all(&[b"data: {not json\ndata: {\"token\":\"ok\"}\n"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::Malformed {
                    raw: "data: {not json".to_string(),
                },
                token("ok"),
                StreamEvent::Complete,
            ],
        );
    }

    #[test]
    fn empty_payload_and_empty_token_produce_no_event() {
        let events = feed_all(&[b"data: {}\ndata: {\"token\":\"\"}\n"]);
        assert_eq!(events, vec![StreamEvent::Complete]);
    }

    #[test]
    fn bytes_after_done_are_ignored() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(b"data: {\"done\":true}\ndata: {\"token\":\"late\"}\n");
        assert_eq!(events, vec![StreamEvent::Complete]);

        assert!(decoder.feed(b"data: {\"token\":\"later\"}\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn exhaustion_without_done_synthesizes_exactly_one_complete() {
        let events = feed_all(&[b"data: {\"token\":\"partial\"}\n"]);
        assert_eq!(events, vec![token("partial"), StreamEvent::Complete]);

        let terminal_count = events
            .iter()
            .filter(|event| matches!(event, StreamEvent::Complete))
            .count();
        assert_eq!(terminal_count, 1);
    }

    #[test]
    fn trailing_fragment_without_newline_is_processed_at_finish() {
        let events = feed_all(&[b"data: {\"token\":\"tail\"}"]);
        assert_eq!(events, vec![token("tail"), StreamEvent::Complete]);
    }

    #[test]
    fn crlf_terminated_frames_decode_cleanly() {
        let events = feed_all(&[b"data: {\"token\":\"x\"}\r\ndata: {\"done\":true}\r\n"]);
        assert_eq!(events, vec![token("x"), StreamEvent::Complete]);
    }

    #[tokio::test]
    async fn consumer_pulls_events_in_order_and_terminates_once() {
        let chunks: Vec<Result<Vec<u8>, BackendError>> = vec![
            Ok(b"data: {\"token\":\"a\"}\ndata: {\"tok".to_vec()),
            Ok(b"en\":\"b\"}\n".to_vec()),
            Ok(b"data: {\"done\":true}\n".to_vec()),
        ];
        let mut consumer = ResponseConsumer::new(Box::pin(futures::stream::iter(chunks)));

        assert_eq!(consumer.next_event().await.unwrap().unwrap(), token("a"));
        assert_eq!(consumer.next_event().await.unwrap().unwrap(), token("b"));
        assert_eq!(
            consumer.next_event().await.unwrap().unwrap(),
            StreamEvent::Complete,
        );
        assert!(consumer.next_event().await.is_none());
        assert!(consumer.next_event().await.is_none());
    }

    #[tokio::test]
    async fn consumer_surfaces_transport_error_once_then_ends() {
        let chunks: Vec<Result<Vec<u8>, BackendError>> = vec![
            Ok(b"data: {\"token\":\"a\"}\n".to_vec()),
            Err(BackendError::Status {
                stage: "read-stream-chunk",
                status: 502,
                body: String::new(),
            }),
        ];
        let mut consumer = ResponseConsumer::new(Box::pin(futures::stream::iter(chunks)));

        assert_eq!(consumer.next_event().await.unwrap().unwrap(), token("a"));
        assert!(consumer.next_event().await.unwrap().is_err());
        assert!(consumer.next_event().await.is_none());
    }
}
