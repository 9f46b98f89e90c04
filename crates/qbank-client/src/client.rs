//! Question-bank HTTP client implementation

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{QbankClientError, Result};
use crate::streaming::{EventStream, Protocol};
use crate::types::*;

/// Default request timeout for non-streaming calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server paths of every endpoint the client calls.
///
/// Defaults match the stock server; any path can be overridden from the
/// `[endpoints]` table of the CLI config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub compare: String,
    pub book_content: String,
    pub import_run: String,
    pub book_list: String,
    pub book_save: String,
    pub book_delete: String,
    pub question_list: String,
    pub question_manage: String,
    pub review: String,
    pub review_history: String,
    pub generate: String,
    pub save_question: String,
    pub batch_start: String,
    pub batch_stop: String,
    pub batch_progress: String,
    pub config_get: String,
    pub config_save: String,
    pub system_logs: String,
    pub system_logs_clear: String,
    pub knowledge_collections: String,
    pub knowledge_overview: String,
    pub knowledge_query: String,
    pub knowledge_save: String,
    pub knowledge_delete: String,
    pub audit_ranges: String,
    pub audit_list: String,
    pub audit_save: String,
    pub audit_delete: String,
    pub audit_embed: String,
    pub search: String,
    pub level_lookup: String,
    pub update_rag: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            compare: "/api/smart_compare/process".into(),
            book_content: "/api/smart_compare/get_book_content".into(),
            import_run: "/api/import/task/run".into(),
            book_list: "/api/import/book/list".into(),
            book_save: "/api/import/book/save".into(),
            book_delete: "/api/import/book/delete".into(),
            question_list: "/api/data/question/list".into(),
            question_manage: "/api/data/question/manage".into(),
            review: "/api/tool/review".into(),
            review_history: "/api/data/review/history".into(),
            generate: "/api/generate/question".into(),
            save_question: "/api/question/save_to_db".into(),
            batch_start: "/api/batch/start".into(),
            batch_stop: "/api/batch/stop".into(),
            batch_progress: "/api/batch/progress".into(),
            config_get: "/api/config/get".into(),
            config_save: "/api/config/save".into(),
            system_logs: "/api/system/logs".into(),
            system_logs_clear: "/api/system/logs/clear".into(),
            knowledge_collections: "/api/knowledge/collections".into(),
            knowledge_overview: "/api/knowledge/overview".into(),
            knowledge_query: "/api/knowledge/query".into(),
            knowledge_save: "/api/knowledge/save".into(),
            knowledge_delete: "/api/knowledge/delete".into(),
            audit_ranges: "/api/audit/ranges".into(),
            audit_list: "/api/audit/list".into(),
            audit_save: "/api/audit/save_fragment".into(),
            audit_delete: "/api/audit/delete_fragment".into(),
            audit_embed: "/api/audit/embed_batch".into(),
            search: "/api/tool/search".into(),
            level_lookup: "/api/tool/level_lookup".into(),
            update_rag: "/api/tool/update_rag".into(),
        }
    }
}

/// Question-bank admin client
///
/// Non-streaming calls carry a per-request timeout. Streaming calls only
/// have a connect timeout: a stream lasts as long as the server keeps it
/// open.
#[derive(Debug, Clone)]
pub struct QbankClient {
    client: Client,
    timeout: Duration,
    base_url: Url,
    endpoints: Endpoints,
}

impl QbankClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the server (e.g., "http://localhost:8000")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a new client with custom timeouts
    pub fn with_config(
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        let base_url = Url::parse(base_url)?;

        Ok(Self {
            client,
            timeout,
            base_url,
            endpoints: Endpoints::default(),
        })
    }

    /// Replace the endpoint paths
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Get a reference to the underlying HTTP client.
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    // =========================================================================
    // Streaming operations
    // =========================================================================

    /// Compare text against the knowledge base (NDJSON stream of records)
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn compare(&self, text: &str) -> Result<EventStream> {
        let url = self.url(&self.endpoints.compare)?;
        self.open_stream(url, &json!({ "text": text }), Protocol::Ndjson)
            .await
    }

    /// Run one import step for a book (prefixed-log stream)
    #[instrument(skip(self))]
    pub async fn run_import(&self, step: ImportStep, book_id: i64) -> Result<EventStream> {
        let mut url = self.url(&self.endpoints.import_run)?;
        url.query_pairs_mut().append_pair("step", step.as_str());
        let body = json!({ "book_id": book_id, "ai_type": "none" });
        self.open_stream(url, &body, Protocol::PrefixedLog).await
    }

    /// Review a question with the streamed reviewer (prefixed-log stream)
    #[instrument(skip(self))]
    pub async fn review_stream(&self, question_id: i64) -> Result<EventStream> {
        let url = self.url(&self.endpoints.review)?;
        let body = json!({ "ai_type": Reviewer::Dingchun, "question_id": question_id });
        self.open_stream(url, &body, Protocol::PrefixedLog).await
    }

    /// Generate questions for a topic (SSE stream)
    #[instrument(skip(self, request), fields(topic = %request.topic))]
    pub async fn generate(&self, request: &GenerationRequest) -> Result<EventStream> {
        let url = self.url(&self.endpoints.generate)?;
        self.open_stream(url, request, Protocol::Sse).await
    }

    // =========================================================================
    // Books
    // =========================================================================

    /// List books with their import progress
    #[instrument(skip(self))]
    pub async fn list_books(&self) -> Result<Vec<Book>> {
        let url = self.url(&self.endpoints.book_list)?;
        debug!("Listing books from {}", url);

        let envelope: Envelope<Vec<Book>> = self.post_json(url, &json!({})).await?;
        Ok(envelope.into_data()?.unwrap_or_default())
    }

    /// Create a book, or update it when `book_id` is set
    #[instrument(skip(self, draft), fields(book = %draft.book_name))]
    pub async fn save_book(&self, draft: &BookDraft) -> Result<Option<String>> {
        let url = self.url(&self.endpoints.book_save)?;
        let ack: Ack = self.post_json(url, draft).await?;
        ack.into_result()
    }

    #[instrument(skip(self))]
    pub async fn delete_book(&self, book_id: i64) -> Result<()> {
        let url = self.url(&self.endpoints.book_delete)?;
        let ack: Ack = self.post_json(url, &json!({ "book_id": book_id })).await?;
        ack.into_result().map(|_| ())
    }

    /// Text of a book's segment range, as input for [`compare`](Self::compare)
    #[instrument(skip(self))]
    pub async fn get_book_content(
        &self,
        book_id: i64,
        start_row: u64,
        end_row: u64,
    ) -> Result<String> {
        let url = self.url(&self.endpoints.book_content)?;
        let body = json!({ "book_id": book_id, "start_row": start_row, "end_row": end_row });
        let envelope: Envelope<String> = self.post_json(url, &body).await?;
        Ok(envelope.into_data()?.unwrap_or_default())
    }

    // =========================================================================
    // Questions
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn list_questions(&self, query: &QuestionQuery) -> Result<QuestionPage> {
        let url = self.url(&self.endpoints.question_list)?;
        let page: QuestionPage = self.post_json(url, query).await?;
        match page.status.as_deref() {
            None | Some("success") => Ok(page),
            Some(other) => Err(QbankClientError::Api(format!("status {}", other))),
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_question(&self, question_id: i64) -> Result<()> {
        let url = self.url(&self.endpoints.question_manage)?;
        let body = json!({ "action": "delete", "payload": { "id": question_id } });
        let ack: Ack = self.post_json(url, &body).await?;
        ack.into_result().map(|_| ())
    }

    /// Let the server's AI parse raw text into questions and store them
    #[instrument(skip(self, raw_text), fields(len = raw_text.len()))]
    pub async fn add_questions(&self, raw_text: &str, source: &str) -> Result<QuestionImport> {
        let url = self.url(&self.endpoints.question_manage)?;
        let body = json!({ "action": "add", "payload": { "raw_text": raw_text, "source": source } });
        let reply: QuestionImport = self.post_json(url, &body).await?;
        reply.into_result()
    }

    /// Overwrite the text fields of a stored question
    #[instrument(skip(self, edit), fields(question_id = edit.question_id))]
    pub async fn update_question(&self, edit: &QuestionEdit) -> Result<Option<String>> {
        let url = self.url(&self.endpoints.question_manage)?;
        let body = json!({ "action": "update", "payload": edit });
        let ack: Ack = self.post_json(url, &body).await?;
        ack.into_result()
    }

    /// Find a question by id through the list search
    #[instrument(skip(self))]
    pub async fn find_question(&self, question_id: i64) -> Result<Option<QuestionSummary>> {
        let query = QuestionQuery {
            page: 1,
            page_size: 50,
            search_text: question_id.to_string(),
        };
        let page = self.list_questions(&query).await?;
        Ok(page.data.into_iter().find(|q| q.question_id == question_id))
    }

    // =========================================================================
    // Reviews
    // =========================================================================

    /// Review history of a question, newest record first per reviewer
    #[instrument(skip(self))]
    pub async fn review_history(&self, question_id: i64) -> Result<ReviewHistory> {
        let url = self.url(&self.endpoints.review_history)?;
        let envelope: Envelope<BTreeMap<String, Vec<ReviewRecord>>> = self
            .post_json(url, &json!({ "question_id": question_id }))
            .await?;

        let mut history = ReviewHistory::new();
        for (name, records) in envelope.into_data()?.unwrap_or_default() {
            match name.parse::<Reviewer>() {
                Ok(reviewer) => {
                    history.insert(reviewer, records);
                }
                Err(_) => debug!("Ignoring history of unknown reviewer '{}'", name),
            }
        }
        Ok(history)
    }

    /// Fetch history into a review session
    pub async fn refresh_session(&self, session: &mut ReviewSession) -> Result<()> {
        let history = self.review_history(session.question_id).await?;
        session.set_history(history);
        Ok(())
    }

    /// Run a non-streamed review (qwen, kimi, doubao)
    #[instrument(skip(self))]
    pub async fn review(&self, reviewer: Reviewer, question_id: i64) -> Result<ReviewRecord> {
        if reviewer.is_streamed() {
            return Err(QbankClientError::Api(format!(
                "{} reviews are streamed; use review_stream",
                reviewer
            )));
        }

        let url = self.url(&self.endpoints.review)?;
        let body = json!({ "ai_type": reviewer, "question_id": question_id });
        let reply: ReviewReply = self.post_json(url, &body).await?;
        reply.into_record()
    }

    // =========================================================================
    // Generated questions
    // =========================================================================

    /// Store a generated question in the bank
    #[instrument(skip(self, question))]
    pub async fn save_question(&self, question: &GeneratedQuestion) -> Result<Option<String>> {
        let url = self.url(&self.endpoints.save_question)?;
        let ack: Ack = self.post_json(url, question).await?;
        ack.into_result()
    }

    // =========================================================================
    // Batch review
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn batch_start(&self, request: &BatchStartRequest) -> Result<Option<String>> {
        let url = self.url(&self.endpoints.batch_start)?;
        let ack: Ack = self.post_json(url, request).await?;
        ack.into_result()
    }

    #[instrument(skip(self))]
    pub async fn batch_stop(&self) -> Result<()> {
        let url = self.url(&self.endpoints.batch_stop)?;
        let ack: Ack = self.post_json(url, &json!({ "confirm": true })).await?;
        ack.into_result().map(|_| ())
    }

    /// One page of the batch progress table
    #[instrument(skip(self))]
    pub async fn batch_progress(&self, page: u32, page_size: u32) -> Result<BatchProgress> {
        let mut url = self.url(&self.endpoints.batch_progress)?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &page_size.to_string());

        let progress: BatchProgress = self.get_json(url).await?;
        if progress.status != "success" {
            return Err(QbankClientError::Api(format!(
                "progress status {}",
                progress.status
            )));
        }
        Ok(progress)
    }

    // =========================================================================
    // System configuration and logs
    // =========================================================================

    /// Raw value of a server config key; `None` when unset
    #[instrument(skip(self))]
    pub async fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut url = self.url(&self.endpoints.config_get)?;
        url.query_pairs_mut().append_pair("key", key);
        let envelope: Envelope<serde_json::Value> = self.get_json(url).await?;
        Ok(envelope.into_data()?.filter(|v| !v.is_null()))
    }

    #[instrument(skip(self, value))]
    pub async fn save_config(&self, key: &str, value: &serde_json::Value) -> Result<Option<String>> {
        let url = self.url(&self.endpoints.config_save)?;
        let body = json!({ "config_key": key, "value": value });
        let ack: Ack = self.post_json(url, &body).await?;
        ack.into_result()
    }

    /// Collections the streamed reviewer searches
    pub async fn search_collections(&self) -> Result<Vec<String>> {
        let value = self.get_config(SEARCH_COLLECTIONS_KEY).await?;
        Ok(value.as_ref().map(collection_list).unwrap_or_default())
    }

    pub async fn set_search_collections(&self, collections: &[String]) -> Result<Option<String>> {
        self.save_config(SEARCH_COLLECTIONS_KEY, &json!(collections))
            .await
    }

    /// Server-side error log, newest first
    #[instrument(skip(self))]
    pub async fn system_logs(&self) -> Result<Vec<SystemLog>> {
        let url = self.url(&self.endpoints.system_logs)?;
        let envelope: Envelope<Vec<SystemLog>> = self.get_json(url).await?;
        Ok(envelope.into_data()?.unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn clear_system_logs(&self) -> Result<()> {
        let url = self.url(&self.endpoints.system_logs_clear)?;
        let ack: Ack = self.post_json(url, &json!({})).await?;
        ack.into_result().map(|_| ())
    }

    // =========================================================================
    // Helper Methods
    // =========================================================================

    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(Into::into)
    }

    pub(crate) async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!("GET {}", url);
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        self.handle_response(response).await
    }

    pub(crate) async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Send a streaming request; only the status is checked before returning
    async fn open_stream<B>(&self, url: Url, body: &B, protocol: Protocol) -> Result<EventStream>
    where
        B: Serialize + ?Sized,
    {
        debug!("Opening {} stream at {}", protocol, url);
        let accept = match protocol {
            Protocol::Sse => "text/event-stream",
            Protocol::Ndjson => "application/x-ndjson",
            Protocol::PrefixedLog => "text/plain",
        };
        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, accept)
            .json(body)
            .send()
            .await
            .map_err(crate::streaming::StreamError::from)?;

        Ok(EventStream::open(response, protocol).await?)
    }

    /// Handle response and deserialize JSON
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| QbankClientError::ParseError(e.to_string()))
        } else {
            Err(self.extract_error(response, status).await)
        }
    }

    async fn extract_error(
        &self,
        response: reqwest::Response,
        status: StatusCode,
    ) -> QbankClientError {
        // FastAPI errors carry `detail`; envelopes carry `msg`
        let message = match response.json::<serde_json::Value>().await {
            Ok(body) => ["detail", "msg", "message"]
                .iter()
                .find_map(|key| body.get(*key))
                .map(|value| match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| format!("HTTP {}", status)),
            Err(_) => format!("HTTP {}", status),
        };

        warn!("Request failed with {}: {}", status, message);
        QbankClientError::server_error(status.as_u16(), message)
    }
}
