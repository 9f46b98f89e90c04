//! Knowledge-base calls of the question-bank client

use serde_json::json;
use tracing::{debug, instrument};

use super::types::*;
use crate::error::{QbankClientError, Result};
use crate::types::{Ack, Envelope};
use crate::QbankClient;

/// Status check for replies that put extra fields next to the envelope
fn check_status(status: Option<&str>, msg: Option<&str>) -> Result<()> {
    match status {
        None | Some("success") => Ok(()),
        Some(other) => Err(QbankClientError::Api(
            msg.map(str::to_string)
                .unwrap_or_else(|| format!("status {}", other)),
        )),
    }
}

impl QbankClient {
    // =========================================================================
    // Collections
    // =========================================================================

    /// Names of all vector collections
    #[instrument(skip(self))]
    pub async fn knowledge_collections(&self) -> Result<Vec<String>> {
        let url = self.url(&self.endpoints().knowledge_collections)?;
        let envelope: Envelope<Vec<String>> = self.get_json(url).await?;
        Ok(envelope.into_data()?.unwrap_or_default())
    }

    /// Collections with their entry counts per source file
    #[instrument(skip(self))]
    pub async fn knowledge_overview(&self) -> Result<Vec<CollectionOverview>> {
        let url = self.url(&self.endpoints().knowledge_overview)?;
        let envelope: Envelope<Vec<CollectionOverview>> = self.get_json(url).await?;
        Ok(envelope.into_data()?.unwrap_or_default())
    }

    /// One filtered page of a collection
    #[instrument(skip(self, query), fields(collection = %query.collection_name, page = query.page))]
    pub async fn query_knowledge(&self, query: &KnowledgeQuery) -> Result<KnowledgePage> {
        let url = self.url(&self.endpoints().knowledge_query)?;
        let page: KnowledgePage = self.post_json(url, query).await?;
        check_status(page.status.as_deref(), page.msg.as_deref())?;
        Ok(page)
    }

    /// Create a document, or replace it when `doc_id` is set
    #[instrument(skip(self, draft), fields(collection = %draft.collection_name))]
    pub async fn save_knowledge(&self, draft: &KnowledgeDraft) -> Result<Option<String>> {
        let url = self.url(&self.endpoints().knowledge_save)?;
        let ack: Ack = self.post_json(url, draft).await?;
        ack.into_result()
    }

    #[instrument(skip(self))]
    pub async fn delete_knowledge(&self, collection_name: &str, doc_id: &str) -> Result<()> {
        let url = self.url(&self.endpoints().knowledge_delete)?;
        let body = json!({ "collection_name": collection_name, "doc_id": doc_id });
        let ack: Ack = self.post_json(url, &body).await?;
        ack.into_result().map(|_| ())
    }

    // =========================================================================
    // Search tool
    // =========================================================================

    /// Semantic search over the configured collections
    #[instrument(skip(self))]
    pub async fn search_knowledge(&self, keyword: &str) -> Result<SearchResults> {
        let url = self.url(&self.endpoints().search)?;
        let results: SearchResults = self.post_json(url, &json!({ "keyword": keyword })).await?;
        check_status(results.status.as_deref(), results.msg.as_deref())?;
        Ok(results)
    }

    /// Search restricted to fragments whose heading path matches `title_filter`
    #[instrument(skip(self))]
    pub async fn level_lookup(&self, title_filter: &str, content: &str) -> Result<SearchResults> {
        let url = self.url(&self.endpoints().level_lookup)?;
        // The server rejects an empty query text
        let content = if content.trim().is_empty() { " " } else { content };
        let body = json!({ "title_filter": title_filter, "search_content": content });
        let results: SearchResults = self.post_json(url, &body).await?;
        check_status(results.status.as_deref(), results.msg.as_deref())?;
        debug!(
            "Level lookup scanned {:?} candidates, {} hits",
            results.total_candidates_scanned,
            results.data.len()
        );
        Ok(results)
    }

    /// Replace the text of a search hit in the vector store
    #[instrument(skip(self, content))]
    pub async fn update_knowledge_item(&self, id: &str, content: &str) -> Result<Option<String>> {
        let url = self.url(&self.endpoints().update_rag)?;
        let ack: Ack = self
            .post_json(url, &json!({ "id": id, "content": content }))
            .await?;
        ack.into_result()
    }

    // =========================================================================
    // Fragment audit
    // =========================================================================

    /// Segment ranges of a book, one per audit batch
    #[instrument(skip(self))]
    pub async fn audit_ranges(&self, book_id: i64) -> Result<Vec<String>> {
        let url = self.url(&self.endpoints().audit_ranges)?;
        let envelope: Envelope<Vec<String>> =
            self.post_json(url, &json!({ "book_id": book_id })).await?;
        Ok(envelope.into_data()?.unwrap_or_default())
    }

    /// Fragments of one segment range (0-based)
    #[instrument(skip(self))]
    pub async fn audit_fragments(&self, book_id: i64, range_index: u32) -> Result<FragmentBatch> {
        let url = self.url(&self.endpoints().audit_list)?;
        let body = json!({ "book_id": book_id, "current_range_index": range_index });
        let batch: FragmentBatch = self.post_json(url, &body).await?;
        check_status(batch.status.as_deref(), batch.msg.as_deref())?;
        Ok(batch)
    }

    /// Create a fragment, or update it when `fragment_id` is set
    #[instrument(skip(self, draft), fields(book_id = draft.book_id))]
    pub async fn save_fragment(&self, draft: &FragmentDraft) -> Result<Option<String>> {
        let url = self.url(&self.endpoints().audit_save)?;
        let ack: Ack = self.post_json(url, draft).await?;
        ack.into_result()
    }

    #[instrument(skip(self))]
    pub async fn delete_fragment(&self, fragment_id: i64) -> Result<()> {
        let url = self.url(&self.endpoints().audit_delete)?;
        let ack: Ack = self
            .post_json(url, &json!({ "fragment_id": fragment_id }))
            .await?;
        ack.into_result().map(|_| ())
    }

    /// Embed reviewed fragments into the vector store
    #[instrument(skip(self, fragment_ids), fields(count = fragment_ids.len()))]
    pub async fn embed_fragments(&self, fragment_ids: &[i64]) -> Result<Option<String>> {
        if fragment_ids.is_empty() {
            return Err(QbankClientError::Api("no fragments selected".to_string()));
        }
        let url = self.url(&self.endpoints().audit_embed)?;
        let ack: Ack = self
            .post_json(url, &json!({ "fragment_ids": fragment_ids }))
            .await?;
        ack.into_result()
    }
}
