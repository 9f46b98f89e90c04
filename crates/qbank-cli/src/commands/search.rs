//! Search command - look up knowledge-base fragments and fix their text

use anyhow::{bail, Result};
use qbank_client::knowledge::SearchHit;
use qbank_client::QbankClient;

use crate::output::{truncate, OutputContext, OutputFormat, SearchRow};

impl From<&SearchHit> for SearchRow {
    fn from(hit: &SearchHit) -> Self {
        Self {
            id: hit.id.clone(),
            score: hit.display_score(),
            source: hit.display_source(),
            path: hit.display_path(),
            content: truncate(&hit.content, 50),
        }
    }
}

/// Search the knowledge base, optionally restricted to a heading filter
pub async fn search(
    client: &QbankClient,
    text: &str,
    level: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    let results = match level.map(str::trim).filter(|l| !l.is_empty()) {
        Some(filter) => client.level_lookup(filter, text).await?,
        None if text.trim().is_empty() => bail!("Nothing to search for"),
        None => client.search_knowledge(text).await?,
    };

    if results.data.is_empty() {
        ctx.info("No matching fragments");
        return Ok(());
    }

    let rows: Vec<SearchRow> = results.data.iter().map(SearchRow::from).collect();
    ctx.print(&rows);
    if let (Some(scanned), OutputFormat::Table) = (results.total_candidates_scanned, ctx.format) {
        ctx.info(&format!("Scanned {} candidates, {} hits", scanned, rows.len()));
    }
    Ok(())
}

/// Replace the stored text of a search hit
pub async fn search_update(
    client: &QbankClient,
    id: &str,
    content: &str,
    ctx: &OutputContext,
) -> Result<()> {
    if content.trim().is_empty() {
        bail!("Content must not be empty");
    }
    client.update_knowledge_item(id, content).await?;
    ctx.success(&format!("Updated knowledge entry {}", id));
    Ok(())
}
