//! Question-bank admin client
//!
//! Typed HTTP client for the question-bank server, plus the pipeline that
//! turns its streaming responses into incremental UI updates.
//!
//! # Example
//!
//! ```rust,no_run
//! use qbank_client::{render_stream, ImportStep, QbankClient};
//! # use qbank_client::render::{Pane, RenderStatus, Region, ResultUnit};
//! # struct Stdout;
//! # impl Region for Stdout {
//! #     fn clear_placeholder(&mut self) {}
//! #     fn append_line(&mut self, _: Pane, text: &str) { println!("{}", text) }
//! #     fn append_result(&mut self, _: usize, _: ResultUnit<'_>) {}
//! #     fn append_error(&mut self, message: &str) { eprintln!("{}", message) }
//! #     fn show_success(&mut self, message: &str) { println!("{}", message) }
//! #     fn set_status(&mut self, _: &RenderStatus) {}
//! # }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = QbankClient::new("http://localhost:8000")?;
//!
//!     for book in client.list_books().await? {
//!         println!("{} {}%", book.book_name, book.split_percent());
//!     }
//!
//!     let events = client.run_import(ImportStep::Split, 7).await?;
//!     let summary = render_stream(events, &mut Stdout).await;
//!     println!("{} events", summary.events);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module serves an axum router in-process:
//!
//! ```rust,ignore
//! use qbank_client::testing::TestServer;
//!
//! let server = TestServer::start(router).await?;
//! let books = server.client.list_books().await?;
//! ```

pub mod batch;
mod client;
mod control;
mod error;
pub mod knowledge;
pub mod render;
pub mod streaming;
pub mod testing;
mod types;

pub use client::{Endpoints, QbankClient};
pub use control::{Control, ControlGuard};
pub use error::{QbankClientError, Result};
pub use types::*;

pub use batch::{BatchMonitor, MonitorState, PollConfig, ProgressSource, Snapshot};
pub use render::{render_failure, render_stream, RenderSummary, Region, Renderer, Termination};

// Re-export streaming types for convenience
pub use streaming::{ApplicationEvent, EventStream, Protocol, StreamError};
