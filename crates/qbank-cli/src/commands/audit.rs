//! Audit commands - review AI-structured fragments before embedding

use anyhow::{bail, Result};
use qbank_client::knowledge::{AuditFragment, FragmentDraft};
use qbank_client::QbankClient;

use crate::output::{truncate, FragmentRow, OutputContext, OutputFormat, RangeRow};

impl From<&AuditFragment> for FragmentRow {
    fn from(fragment: &AuditFragment) -> Self {
        Self {
            id: fragment.fragment_id,
            title: fragment.title().to_string(),
            embedded: if fragment.is_embedded { "yes" } else { "no" }.to_string(),
            content: truncate(&fragment.content, 50),
        }
    }
}

/// Which fragments to embed
pub enum EmbedSelection {
    /// Explicit fragment ids
    Ids(Vec<i64>),
    /// Every fragment of one audit batch not embedded yet
    Pending { book_id: i64, range: u32 },
}

/// List the audit batches of a book
pub async fn audit_ranges(client: &QbankClient, book_id: i64, ctx: &OutputContext) -> Result<()> {
    let ranges = client.audit_ranges(book_id).await?;
    if ranges.is_empty() {
        ctx.info(&format!("Book {} has no fragments to audit", book_id));
        return Ok(());
    }
    let rows: Vec<RangeRow> = ranges
        .into_iter()
        .enumerate()
        .map(|(index, range)| RangeRow { index, range })
        .collect();
    ctx.print(&rows);
    Ok(())
}

/// List the fragments of one audit batch
pub async fn audit_list(
    client: &QbankClient,
    book_id: i64,
    range: u32,
    ctx: &OutputContext,
) -> Result<()> {
    let batch = client.audit_fragments(book_id, range).await?;
    let rows: Vec<FragmentRow> = batch.data.iter().map(FragmentRow::from).collect();
    ctx.print(&rows);

    if ctx.format == OutputFormat::Table {
        ctx.info(&format!(
            "Batch {} of {} (segments {})",
            batch.current_batch_idx + 1,
            batch.total_batches.max(1),
            batch.current_range.as_deref().unwrap_or("-")
        ));
    }
    Ok(())
}

/// Create or update a fragment
pub async fn audit_save(
    client: &QbankClient,
    draft: FragmentDraft,
    ctx: &OutputContext,
) -> Result<()> {
    if draft.content.trim().is_empty() {
        bail!("Fragment content must not be empty");
    }
    client.save_fragment(&draft).await?;
    match draft.fragment_id {
        Some(id) => ctx.success(&format!("Updated fragment {} ({})", id, draft.combo_title)),
        None => ctx.success(&format!("Added fragment '{}'", draft.combo_title)),
    }
    Ok(())
}

pub async fn audit_delete(
    client: &QbankClient,
    fragment_id: i64,
    ctx: &OutputContext,
) -> Result<()> {
    client.delete_fragment(fragment_id).await?;
    ctx.success(&format!("Deleted fragment {}", fragment_id));
    Ok(())
}

/// Embed reviewed fragments into the vector store
pub async fn audit_embed(
    client: &QbankClient,
    selection: EmbedSelection,
    ctx: &OutputContext,
) -> Result<()> {
    let ids = match selection {
        EmbedSelection::Ids(ids) => ids,
        EmbedSelection::Pending { book_id, range } => {
            let batch = client.audit_fragments(book_id, range).await?;
            pending_ids(&batch.data)
        }
    };
    if ids.is_empty() {
        ctx.info("Nothing to embed");
        return Ok(());
    }

    let message = client.embed_fragments(&ids).await?;
    ctx.success(&message.unwrap_or_else(|| format!("Embedded {} fragments", ids.len())));
    Ok(())
}

fn pending_ids(fragments: &[AuditFragment]) -> Vec<i64> {
    fragments
        .iter()
        .filter(|f| !f.is_embedded)
        .map(|f| f.fragment_id)
        .collect()
}
