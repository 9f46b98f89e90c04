//! Streaming responses
//!
//! Long-running endpoints answer with a body that is written incrementally.
//! Three wire protocols are in use:
//!
//! - NDJSON (smart compare): one comparison record per line
//! - prefixed log (imports, streamed review): `LOG: ` lines, then one `DATA: ` result
//! - SSE (question generation): `data:` blocks, ended by `data: [DONE]`
//!
//! Bytes flow through [`TransportReader`] (incremental UTF-8), [`FrameBuffer`]
//! (delimiter splitting) and [`FrameParser`] (payload decoding) and come out
//! of an [`EventStream`] as [`ApplicationEvent`]s.
//!
//! # Example
//!
//! ```no_run
//! use qbank_client::{ApplicationEvent, QbankClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = QbankClient::new("http://localhost:8000")?;
//! let mut events = client.compare("Each tablet contains 0.5 g.").await?;
//!
//! while let Some(event) = events.next().await {
//!     match event? {
//!         ApplicationEvent::Record(record) => println!("{:?}", record.status()),
//!         other => println!("{}", other.name()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod decoder;
mod events;
mod frame;
mod parser;
mod reader;
mod types;

pub use decoder::Utf8Decoder;
pub use events::EventStream;
pub use frame::{FrameBuffer, Protocol};
pub use parser::{decode_frame, Decoded, FrameParser};
pub use reader::TransportReader;
pub use types::{
    ApplicationEvent, ComparisonRecord, ComparisonResult, Completion, ConsistencyStatus,
    FrameDecodeError, Fragment, StreamError, StreamResult, TaskOutcome,
};
