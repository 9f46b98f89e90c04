//! Compare command - check text against the knowledge base

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use qbank_client::{Control, QbankClient};

use super::{conclude, open_region, render};
use crate::output::OutputContext;

/// Where the text to compare comes from
#[derive(Debug, Clone)]
pub enum CompareSource {
    Text(String),
    File(PathBuf),
    /// Segment range of an imported book
    Book { book_id: i64, start: u64, end: u64 },
}

impl CompareSource {
    async fn resolve(self, client: &QbankClient) -> Result<String> {
        match self {
            CompareSource::Text(text) => Ok(text),
            CompareSource::File(path) => std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display())),
            CompareSource::Book {
                book_id,
                start,
                end,
            } => {
                if end < start {
                    bail!("Invalid row range {}..{}", start, end);
                }
                client
                    .get_book_content(book_id, start, end)
                    .await
                    .with_context(|| format!("Failed to load rows {}..{} of book {}", start, end, book_id))
            }
        }
    }
}

/// Stream a smart comparison of the source text
pub async fn compare(client: &QbankClient, source: CompareSource, ctx: &OutputContext) -> Result<()> {
    let text = source.resolve(client).await?;
    if text.trim().is_empty() {
        bail!("Nothing to compare: the text is empty");
    }

    ctx.watch_interrupts();
    let control = Control::new();
    let mut region = open_region(&control, "Comparing against the knowledge base...", ctx)?;
    let summary = render(client.compare(&text).await, &mut region, ctx).await;
    drop(region);

    if !ctx.is_json() && !ctx.quiet && summary.results == 0 && summary.is_success() {
        ctx.warn("The server returned no comparison results");
    }
    conclude(&summary, "Comparison", ctx)
}
