//! Test utilities for qbank-client
//!
//! Runs an in-process axum server standing in for the question-bank server,
//! and builds its streaming bodies (NDJSON, `LOG:`/`DATA:` lines, SSE) cut
//! into arbitrary pieces so split frames and split code points reach the
//! client over real HTTP.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::streaming::Protocol;
use crate::{QbankClient, Result};

/// Pause between two pieces of a chunked body
const PIECE_DELAY: Duration = Duration::from_millis(5);

/// A fake question-bank server that shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: QbankClient,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve an axum Router on an ephemeral port
    ///
    /// # Example
    ///
    /// ```ignore
    /// use axum::{routing::post, Router};
    /// use qbank_client::testing::{self, TestServer};
    /// use qbank_client::streaming::Protocol;
    ///
    /// let router = Router::new().route(
    ///     "/api/tool/review",
    ///     post(|| async { testing::chunked(Protocol::PrefixedLog, "LOG: a\nDATA: {}\n", 3) }),
    /// );
    /// let server = TestServer::start(router).await?;
    ///
    /// let events = server.client.review_stream(12).await?;
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        Self::start_with_timeout(router, Duration::from_secs(5), Duration::from_secs(2)).await
    }

    /// Serve a router with custom client timeouts
    pub async fn start_with_timeout<S>(
        router: axum::Router<S>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let router: axum::Router = router.into();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        let client = QbankClient::with_config(&format!("http://{}", addr), timeout, connect_timeout)?;

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> &QbankClient {
        &self.client
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Streaming bodies
// =============================================================================

/// Content type the server sends for a streaming protocol
pub fn content_type(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Ndjson => "application/x-ndjson",
        Protocol::PrefixedLog => "text/plain; charset=utf-8",
        Protocol::Sse => "text/event-stream",
    }
}

/// Cut a body every `step` bytes, ignoring character boundaries
pub fn pieces(body: impl AsRef<[u8]>, step: usize) -> Vec<Bytes> {
    body.as_ref()
        .chunks(step.max(1))
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Streaming response delivering `body` in pieces of `step` bytes
pub fn chunked(protocol: Protocol, body: impl AsRef<[u8]>, step: usize) -> Response {
    chunked_parts(protocol, pieces(body, step))
}

/// Streaming response delivering the given pieces with a pause between them
pub fn chunked_parts(protocol: Protocol, parts: Vec<Bytes>) -> Response {
    let body = Body::from_stream(async_stream::stream! {
        for part in parts {
            tokio::time::sleep(PIECE_DELAY).await;
            yield Ok::<_, std::io::Error>(part);
        }
    });

    let mut response = Response::new(body);
    if let Ok(value) = content_type(protocol).parse() {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

/// NDJSON body, one record per line
pub fn ndjson_body(records: &[Value]) -> String {
    records.iter().map(|r| format!("{}\n", r)).collect()
}

/// Prefixed-log body: `LOG:` lines closed by a `DATA:` outcome
pub fn log_body(lines: &[&str], outcome: &Value) -> String {
    let mut body: String = lines.iter().map(|l| format!("LOG: {}\n", l)).collect();
    body.push_str(&format!("DATA: {}\n", outcome));
    body
}

/// SSE body of JSON payloads closed by the `[DONE]` sentinel
pub fn sse_body(payloads: &[Value]) -> String {
    let mut body: String = payloads.iter().map(|p| format!("data: {}\n\n", p)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}
