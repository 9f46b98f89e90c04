//! Transport reader: response bytes to decoded text chunks

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use tracing::{debug, trace};

use super::decoder::Utf8Decoder;
use super::types::{StreamError, StreamResult};

type ByteStream = Pin<Box<dyn Stream<Item = StreamResult<Bytes>> + Send>>;

/// Lazily reads a byte stream and yields decoded text.
///
/// Never buffers the whole body. A read error is yielded once and ends the
/// reader; the decoder is flushed when the byte stream completes.
pub struct TransportReader {
    bytes: ByteStream,
    decoder: Utf8Decoder,
    bytes_read: usize,
    done: bool,
}

impl TransportReader {
    /// Read the body of an HTTP response
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::from_stream(response.bytes_stream())
    }

    /// Read any byte stream whose errors convert into [`StreamError`]
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<StreamError>,
    {
        Self {
            bytes: Box::pin(stream.map(|chunk| chunk.map_err(Into::<StreamError>::into))),
            decoder: Utf8Decoder::new(),
            bytes_read: 0,
            done: false,
        }
    }

    /// Total bytes received so far
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }
}

impl Stream for TransportReader {
    type Item = StreamResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if this.done {
                return Poll::Ready(None);
            }

            match this.bytes.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.bytes_read += chunk.len();
                    trace!("Read {} bytes", chunk.len());
                    let text = this.decoder.decode(&chunk);
                    if !text.is_empty() {
                        return Poll::Ready(Some(Ok(text)));
                    }
                    // Chunk held only part of a character; keep reading
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    debug!("Byte stream ended after {} bytes", this.bytes_read);
                    let tail = this.decoder.finish();
                    if tail.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Ok(tail)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
