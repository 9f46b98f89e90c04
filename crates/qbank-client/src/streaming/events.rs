//! Event stream: transport reader and frame parser composed

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use tracing::{debug, warn};

use super::frame::Protocol;
use super::parser::FrameParser;
use super::reader::TransportReader;
use super::types::{ApplicationEvent, StreamError, StreamResult};

/// A live streaming response, yielding [`ApplicationEvent`]s in wire order.
///
/// Implements `Stream<Item = Result<ApplicationEvent, StreamError>>`. The
/// stream ends when the body ends, after the SSE `[DONE]` sentinel, or after
/// yielding a transport error. Dropping it closes the connection.
///
/// ```ignore
/// let mut events = client.run_import(ImportStep::Split, 7).await?;
///
/// while let Some(event) = events.next().await {
///     println!("{:?}", event?);
/// }
/// ```
pub struct EventStream {
    reader: TransportReader,
    parser: FrameParser,
    pending: VecDeque<ApplicationEvent>,
    ended: bool,
}

impl EventStream {
    /// Wrap a response whose status was already checked
    pub fn new(reader: TransportReader, protocol: Protocol) -> Self {
        Self {
            reader,
            parser: FrameParser::new(protocol),
            pending: VecDeque::new(),
            ended: false,
        }
    }

    /// Start streaming a response; a non-2xx status fails before any frame
    pub async fn open(response: reqwest::Response, protocol: Protocol) -> StreamResult<Self> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Stream request failed with {}: {}", status, message);
            return Err(StreamError::Server {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Streaming {} response from {}", protocol, response.url());
        Ok(Self::new(TransportReader::from_response(response), protocol))
    }

    pub fn protocol(&self) -> Protocol {
        self.parser.protocol()
    }

    /// Get the next event from the stream
    ///
    /// Returns `None` when the stream is over.
    pub async fn next(&mut self) -> Option<StreamResult<ApplicationEvent>> {
        <Self as StreamExt>::next(self).await
    }

    /// Malformed frames skipped so far
    pub fn dropped_frames(&self) -> usize {
        self.parser.dropped_frames()
    }

    /// Whether the server signalled the end of the stream itself
    pub fn is_finished(&self) -> bool {
        self.parser.is_finished()
    }

    /// Total bytes received so far
    pub fn bytes_read(&self) -> usize {
        self.reader.bytes_read()
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("parser", &self.parser)
            .field("pending", &self.pending)
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

impl Stream for EventStream {
    type Item = StreamResult<ApplicationEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            if this.ended || this.parser.is_finished() {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.reader).poll_next(cx) {
                Poll::Ready(Some(Ok(text))) => {
                    this.pending.extend(this.parser.feed(&text));
                }
                Poll::Ready(Some(Err(e))) => {
                    this.ended = true;
                    this.parser.finish();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.ended = true;
                    this.parser.finish();
                    debug!(
                        "Stream ended: {} bytes, {} dropped frames",
                        this.reader.bytes_read(),
                        this.parser.dropped_frames()
                    );
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
