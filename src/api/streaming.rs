use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::api::client::EventStream;
use crate::api::models::{StreamEvent, StreamResponse};
use crate::error::LedgerChatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Data(String),
    Done,
}

/// Splits a chunked SSE body into `data:` frames.
///
/// Bytes are buffered until a full line is available, so frames and
/// multi-byte characters split across network chunks decode intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);

        // Only process complete lines
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        let text = String::from_utf8_lossy(&complete);

        text.lines().filter_map(parse_line).collect()
    }

    /// Flush a trailing line the server never terminated.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&rest);
        text.lines().filter_map(parse_line).collect()
    }
}

fn parse_line(line: &str) -> Option<SseFrame> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let (field, value) = match line.find(':') {
        Some(pos) => (line[..pos].trim(), line[pos + 1..].trim_start()),
        None => (line.trim(), ""),
    };

    match field {
        "data" if value == "[DONE]" => Some(SseFrame::Done),
        "data" => Some(SseFrame::Data(value.to_string())),
        "event" | "id" | "retry" => {
            debug!(field, value, "ignoring SSE field");
            None
        }
        _ => {
            debug!(field, "unknown SSE field");
            None
        }
    }
}

/// Turn a raw chat-completions SSE body into decoded stream events.
///
/// Fails with `Timeout` when no bytes arrive within `chunk_timeout`.
/// Unparseable data frames are logged and skipped.
pub fn event_stream<S>(body: S, chunk_timeout: Duration) -> EventStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::new();
        let mut finished = false;

        'read: loop {
            let (frames, exhausted) = match timeout(chunk_timeout, body.next()).await {
                Ok(Some(Ok(chunk))) => (decoder.feed(&chunk), false),
                Ok(Some(Err(e))) => {
                    yield Err(LedgerChatError::NetworkError(e));
                    break;
                }
                Ok(None) => (decoder.finish(), true),
                Err(_) => {
                    yield Err(LedgerChatError::Timeout);
                    break;
                }
            };

            for frame in frames {
                match frame {
                    SseFrame::Done => {
                        finished = true;
                        break 'read;
                    }
                    SseFrame::Data(data) => match serde_json::from_str::<StreamResponse>(&data) {
                        Ok(parsed) => {
                            if let Some(event) = parsed.into_event() {
                                yield Ok::<StreamEvent, LedgerChatError>(event);
                            }
                        }
                        Err(e) => warn!(error = %e, "skipping unparseable stream chunk"),
                    },
                }
            }

            if exhausted {
                break;
            }
        }

        if !finished {
            debug!("stream ended without [DONE]");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frames_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"a\":").is_empty());
        let frames = decoder.feed(b"1}\n\ndata: [DONE]\n");
        assert_eq!(
            frames,
            vec![SseFrame::Data("{\"a\":1}".to_string()), SseFrame::Done]
        );
    }

    #[test]
    fn skips_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": OPENROUTER PROCESSING\nevent: message\r\ndata: x\r\n");
        assert_eq!(frames, vec![SseFrame::Data("x".to_string())]);
    }

    #[test]
    fn keeps_multibyte_characters_split_between_chunks() {
        let payload = "data: caf\u{e9}\n".as_bytes();
        let (head, tail) = payload.split_at(payload.len() - 2);
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(head).is_empty());
        assert_eq!(decoder.feed(tail), vec![SseFrame::Data("caf\u{e9}".to_string())]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec![SseFrame::Data("tail".to_string())]);
        assert!(decoder.finish().is_empty());
    }

    fn body(chunks: &[&'static str]) -> impl Stream<Item = reqwest::Result<Bytes>> + Send {
        let items: Vec<reqwest::Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        futures::stream::iter(items)
    }

    #[tokio::test]
    async fn event_stream_stops_at_done() {
        let events: Vec<_> = event_stream(
            body(&[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
                "data: [DONE]\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
            ]),
            Duration::from_secs(5),
        )
        .collect()
        .await;

        let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].content.as_deref(), Some("Hel"));
        assert_eq!(events[1].finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn event_stream_skips_garbage_and_drains_without_done() {
        let events: Vec<_> = event_stream(
            body(&["data: not json\n", "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}"]),
            Duration::from_secs(5),
        )
        .collect()
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().content.as_deref(), Some("ok"));
    }
}
