//! Knowledge base maintenance
//!
//! Browsing and editing the vector collections, auditing AI-structured
//! fragments before they are embedded, and the knowledge-base search tool.
//! All calls are plain envelope requests on [`QbankClient`](crate::QbankClient).
//!
//! # Example
//!
//! ```rust,ignore
//! use qbank_client::knowledge::{FragmentDraft, KnowledgeQuery};
//!
//! let page = client.query_knowledge(&KnowledgeQuery::default()).await?;
//! for doc in &page.data {
//!     println!("{} {}", doc.combo_title(), doc.plain_content());
//! }
//!
//! let ranges = client.audit_ranges(7).await?;
//! let batch = client.audit_fragments(7, 0).await?;
//! ```

mod client;
mod types;

pub use types::*;
