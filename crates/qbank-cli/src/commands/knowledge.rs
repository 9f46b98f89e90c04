//! Knowledge commands - browse and edit the vector collections

use anyhow::Result;
use qbank_client::knowledge::{CollectionOverview, KnowledgeDoc, KnowledgeDraft, KnowledgeQuery};
use qbank_client::QbankClient;

use crate::output::{truncate, CollectionRow, KnowledgeRow, OutputContext, OutputFormat};

impl From<&KnowledgeDoc> for KnowledgeRow {
    fn from(doc: &KnowledgeDoc) -> Self {
        Self {
            id: doc.id.clone(),
            heading: doc.heading(),
            title: doc.combo_title(),
            source: doc.source_file().unwrap_or("-").to_string(),
            content: truncate(doc.plain_content(), 40),
        }
    }
}

fn collection_row(overview: CollectionOverview, searched: &[String]) -> CollectionRow {
    let entries = if overview.is_readable() {
        overview.total_count.to_string()
    } else {
        "unreadable".to_string()
    };
    let sources = overview
        .sources
        .iter()
        .map(|s| format!("{} ({})", s.name, s.count))
        .collect::<Vec<_>>()
        .join(", ");
    CollectionRow {
        searched: if searched.contains(&overview.collection_name) {
            "yes".to_string()
        } else {
            String::new()
        },
        name: overview.collection_name,
        entries,
        sources,
    }
}

/// List collections with their sources, marking the ones reviews search
pub async fn knowledge_collections(client: &QbankClient, ctx: &OutputContext) -> Result<()> {
    let (overview, searched) =
        tokio::try_join!(client.knowledge_overview(), client.search_collections())?;
    let rows: Vec<CollectionRow> = overview
        .into_iter()
        .map(|o| collection_row(o, &searched))
        .collect();
    ctx.print(&rows);
    Ok(())
}

/// List one filtered page of a collection
pub async fn knowledge_list(
    client: &QbankClient,
    query: KnowledgeQuery,
    ctx: &OutputContext,
) -> Result<()> {
    let page = client.query_knowledge(&query).await?;
    let rows: Vec<KnowledgeRow> = page.data.iter().map(KnowledgeRow::from).collect();
    ctx.print(&rows);

    if ctx.format == OutputFormat::Table {
        let pages = page.total.div_ceil(u64::from(query.page_size.max(1))).max(1);
        ctx.info(&format!(
            "{}: page {} of {} ({} entries)",
            query.collection_name, query.page, pages, page.total
        ));
    }
    Ok(())
}

/// Create or replace a document
pub async fn knowledge_save(
    client: &QbankClient,
    draft: KnowledgeDraft,
    ctx: &OutputContext,
) -> Result<()> {
    client.save_knowledge(&draft).await?;
    ctx.success(&format!("Saved '{}' to {}", draft.combo_title(), draft.collection_name));
    Ok(())
}

pub async fn knowledge_delete(
    client: &QbankClient,
    collection: &str,
    doc_id: &str,
    ctx: &OutputContext,
) -> Result<()> {
    client.delete_knowledge(collection, doc_id).await?;
    ctx.success(&format!("Deleted {} from {}", doc_id, collection));
    Ok(())
}
