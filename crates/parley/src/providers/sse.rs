//! Line-oriented server-sent-events decoding shared by every provider.
//!
//! The body is framed into lines first and only then decoded as UTF-8, so a
//! multi-byte character split across two network deliveries is reassembled
//! before any text reaches a decoder.
use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::time::timeout;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;

use super::base::ChunkStream;
use crate::errors::ProviderError;
use crate::models::chunk::StreamChunk;

pub const DONE_SENTINEL: &str = "[DONE]";
const DATA_PREFIX: &str = "data:";

/// Splits a byte stream on `\n`, dropping a trailing `\r`
#[derive(Debug, Default)]
pub struct SseLineCodec {
    // Bytes before this offset are known not to contain a newline
    next_index: usize,
}

impl SseLineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for SseLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match buf[self.next_index..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let newline = self.next_index + offset;
                self.next_index = 0;
                let line = buf.split_to(newline + 1);
                Ok(Some(decode_line(&line[..newline])))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        self.next_index = 0;
        let rest = buf.split();
        Ok(Some(decode_line(&rest)))
    }
}

/// The payload of a `data:` line, or `None` for any other line
pub fn data_payload(line: &str) -> Option<&str> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    Some(payload.strip_prefix(' ').unwrap_or(payload))
}

/// What a provider decoder made of one `data:` payload
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Chunk(StreamChunk),
    /// The backend signalled the end of the response inside the payload
    Terminal(Option<StreamChunk>),
    /// The backend reported an error in-band; the stream fails
    Fatal(ProviderError),
}

/// Backend-specific JSON decoding of SSE payloads
pub trait ChunkDecoder: Send + 'static {
    /// Decode one payload. An `Err` means the frame is malformed and is skipped.
    fn decode(&mut self, payload: &str) -> Result<DecodedFrame, ProviderError>;

    /// Called once when the stream ends without a fatal error, to release
    /// anything the decoder was still assembling
    fn finish(&mut self) -> Option<StreamChunk> {
        None
    }
}

/// Turn a response body into normalized chunks.
///
/// Ends on `[DONE]`, on a terminal frame, on EOF, or on the first error.
/// Malformed frames are logged and skipped, and empty chunks are not yielded.
pub fn normalize<S, E, D>(body: S, mut decoder: D, idle_timeout: Duration) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    D: ChunkDecoder,
{
    let body = Box::pin(body.map(|delivery| delivery.map_err(io::Error::other)));
    let mut lines = FramedRead::new(StreamReader::new(body), SseLineCodec::new());

    Box::pin(async_stream::stream! {
        loop {
            let line = match timeout(idle_timeout, lines.next()).await {
                Err(_) => {
                    yield Err(ProviderError::Network(format!(
                        "no data received for {:?}",
                        idle_timeout
                    )));
                    break;
                }
                Ok(None) => {
                    if let Some(chunk) = decoder.finish() {
                        yield Ok(chunk);
                    }
                    break;
                }
                Ok(Some(Err(e))) => {
                    yield Err(ProviderError::Network(e.to_string()));
                    break;
                }
                Ok(Some(Ok(line))) => line,
            };

            let Some(payload) = data_payload(&line) else {
                continue;
            };

            if payload.trim() == DONE_SENTINEL {
                if let Some(chunk) = decoder.finish() {
                    yield Ok(chunk);
                }
                break;
            }

            match decoder.decode(payload) {
                Ok(DecodedFrame::Chunk(chunk)) => {
                    if !chunk.is_empty() {
                        yield Ok(chunk);
                    }
                }
                Ok(DecodedFrame::Terminal(chunk)) => {
                    if let Some(chunk) = chunk.filter(|chunk| !chunk.is_empty()) {
                        yield Ok(chunk);
                    }
                    if let Some(chunk) = decoder.finish() {
                        yield Ok(chunk);
                    }
                    break;
                }
                Ok(DecodedFrame::Fatal(err)) => {
                    tracing::error!("Provider reported an error mid-stream: {}", err);
                    yield Err(err);
                    break;
                }
                Err(err) => {
                    tracing::warn!("Skipping malformed stream frame: {}", err);
                }
            }
        }
    })
}
