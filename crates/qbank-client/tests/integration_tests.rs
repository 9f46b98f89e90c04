//! Integration tests for qbank-client
//!
//! These tests serve a fake question-bank server with axum and drive the
//! client against it over real HTTP, with chunked streaming bodies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use qbank_client::knowledge::{FragmentDraft, KnowledgeDraft, KnowledgeQuery, DEFAULT_COLLECTION};
use qbank_client::render::{Pane, RenderStatus, Region, ResultUnit};
use qbank_client::testing::{self, chunked, chunked_parts, TestServer};
use qbank_client::{
    render_stream, ApplicationEvent, BatchMonitor, BatchStartRequest, BookDraft, EventStream,
    GenerationRequest, ImportStep, MonitorState, PollConfig, Protocol, QbankClientError,
    QuestionEdit, QuestionQuery, ReviewSession, Reviewer, StreamError, Termination,
};

// =============================================================================
// Fake server
// =============================================================================

#[derive(Clone, Default)]
struct FakeServer {
    batch_total: Arc<AtomicU64>,
    /// Last JSON body posted to a write endpoint
    last_write: Arc<Mutex<Value>>,
    config: Arc<Mutex<Value>>,
}

impl FakeServer {
    fn record(&self, body: Value) {
        *self.last_write.lock() = body;
    }
}

const COMPARE_BODY: &str = concat!(
    "{\"index\":0,\"segment_content\":\"每片含0.5g\",\"comparison_result\":{\"status\":\"fully_consistent\"}}\n",
    "not json at all\n",
    "{\"index\":1,\"segment_content\":\"口服\",\"comparison_result\":{\"status\":\"semantically_consistent\"},",
    "\"retrieved_fragments\":[{\"source\":\"药典|卷一\",\"content\":\"...\",\"raw_score\":0.91}]}\n",
    "{\"index\":2,\"segment_content\":\"unterminated\"}"
);

const GENERATE_BODY: &str = concat!(
    ": keepalive\n\n",
    "data: {\"type\":\"process\",\"content\":\"正在检索知识库\"}\n\n",
    "data: {\"type\":\"snippet\",\"content\":\"片段一\"}\n\n",
    "data: {\"type\":\"process\",\"content\":\"已生成第1题\",\"completion\":\"success\",\"data\":{\"stem\":\"下列说法正确的是\",",
    "\"option_a\":\"甲\",\"option_b\":\"乙\",\"answer\":\"A\"}}\n\n",
    "data: [DONE]\n\n",
    "data: {\"type\":\"error\",\"content\":\"after done\"}\n\n"
);

async fn compare(Json(body): Json<Value>) -> Response {
    if body["text"].as_str().unwrap_or_default().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"detail": "text is empty"}))).into_response();
    }
    chunked(Protocol::Ndjson, COMPARE_BODY, 7)
}

async fn import_run(Query(query): Query<HashMap<String, String>>) -> Response {
    match query.get("step").map(String::as_str) {
        Some("split") => chunked_parts(
            Protocol::PrefixedLog,
            vec![
                Bytes::from_static(b"LOG: reading file\nLOG: spl"),
                Bytes::from_static(b"it 12 segments\r\nprint noise\n"),
                Bytes::from_static(b"DATA: {\"status\":\"success\",\"msg\":\"12 segments\"}\n"),
            ],
        ),
        Some("process") => chunked(
            Protocol::PrefixedLog,
            testing::log_body(&["start"], &json!({"status": "error", "msg": "book not found"})),
            4,
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "embedding service down").into_response(),
    }
}

async fn review(Json(body): Json<Value>) -> Response {
    match body["ai_type"].as_str() {
        Some("dingchun") => chunked(
            Protocol::PrefixedLog,
            testing::log_body(
                &["retrieving"],
                &json!({"status": "success", "review_result": "通过", "review_content": "ok", "rag_context": "ctx-1"}),
            ),
            11,
        ),
        Some("qwen") => Json(json!({
            "status": "success",
            "result": "驳回",
            "content": "option C is wrong"
        }))
        .into_response(),
        _ => Json(json!({"status": "error", "msg": "reviewer offline"})).into_response(),
    }
}

async fn generate(Json(body): Json<Value>) -> Response {
    if body["topic"] == "sparse" {
        let payloads = [
            json!({"type": "snippet", "content": null, "stream": "片段"}),
            json!({"completion": "PASS", "data": {"stem": null, "option_a": "甲", "answer": "A"}}),
        ];
        return chunked(Protocol::Sse, testing::sse_body(&payloads), 3);
    }
    chunked(Protocol::Sse, GENERATE_BODY, 5)
}

async fn book_list() -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": [{
            "book_id": 7,
            "book_name": "Pharmacopoeia",
            "file_path": "/data/p.docx",
            "total_segments": 200,
            "processed_segments": 50
        }]
    }))
}

async fn book_save(Json(body): Json<Value>) -> Json<Value> {
    if body["book_name"].as_str().unwrap_or_default().is_empty() {
        Json(json!({"status": "error", "msg": "name required"}))
    } else {
        Json(json!({"status": "success", "msg": "saved"}))
    }
}

async fn book_content(Json(body): Json<Value>) -> Json<Value> {
    let start = body["start_row"].as_u64().unwrap_or_default();
    let end = body["end_row"].as_u64().unwrap_or_default();
    Json(json!({"status": "success", "data": format!("rows {}-{}", start, end)}))
}

async fn question_list(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "page": body["page"],
        "total": 1,
        "data": [{"question_id": 3, "stem": "Q3", "status_qwen": "通过"}]
    }))
}

async fn question_manage(State(server): State<FakeServer>, Json(body): Json<Value>) -> Json<Value> {
    let reply = match body["action"].as_str() {
        Some("delete") if body["payload"]["id"] == 404 => {
            json!({"status": "error", "message": "no such question"})
        }
        Some("delete") => json!({"status": "success"}),
        Some("add") if body["payload"]["raw_text"] == "" => {
            json!({"status": "error", "msg": "内容不能为空"})
        }
        Some("add") => json!({"status": "success", "msg": "入库成功", "count": 2}),
        Some("update") => json!({"status": "success", "msg": "更新成功"}),
        _ => json!({"status": "error", "msg": "未知操作"}),
    };
    server.record(body);
    Json(reply)
}

async fn question_list_by_id(Json(body): Json<Value>) -> Json<Value> {
    if body["search_text"] != "3" {
        return question_list(Json(body)).await;
    }
    Json(json!({
        "status": "success",
        "page": 1,
        "total": 2,
        "data": [
            {"question_id": 33, "stem": "Q33"},
            {"question_id": 3, "stem": "Q3", "answer": "A", "option_a": "甲", "option_b": "乙", "option_c": null}
        ]
    }))
}

// Knowledge base, audit and search

async fn knowledge_collections() -> Json<Value> {
    Json(json!({"status": "success", "data": ["Pharmacopoeia_Official", "Guidelines"]}))
}

async fn knowledge_overview() -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": [
            {"collection_name": "Pharmacopoeia_Official", "total_count": 120,
             "sources": [{"name": "药典.docx", "count": 100}, {"name": "附录.docx", "count": 20}]},
            {"collection_name": "Broken", "total_count": -1, "sources": null}
        ]
    }))
}

async fn knowledge_query(Json(body): Json<Value>) -> Json<Value> {
    if body["collection_name"] == "Missing" {
        return Json(json!({"status": "error", "msg": "collection not found"}));
    }
    Json(json!({
        "status": "success",
        "page": body["page"],
        "total": 21,
        "data": [{
            "id": "doc-1",
            "content": "二部 > 片剂\n每片0.5g",
            "metadata": {"来源文件": "药典.docx", "L1": "二部", "L2": "片剂", "片段内容": "每片0.5g",
                         "filter_echo": body["filters"]["L1"]}
        }]
    }))
}

async fn record_write(State(server): State<FakeServer>, Json(body): Json<Value>) -> Json<Value> {
    server.record(body);
    Json(json!({"status": "success", "msg": "ok"}))
}

async fn knowledge_delete(Json(body): Json<Value>) -> Json<Value> {
    if body["doc_id"] == "missing" {
        Json(json!({"status": "error", "msg": "not found"}))
    } else {
        Json(json!({"status": "success", "msg": "deleted"}))
    }
}

async fn audit_ranges(Json(body): Json<Value>) -> Json<Value> {
    if body["book_id"] == 7 {
        Json(json!({"status": "success", "data": ["1-20", "21-40"]}))
    } else {
        Json(json!({"status": "success", "data": []}))
    }
}

async fn audit_list(Json(body): Json<Value>) -> Json<Value> {
    let index = body["current_range_index"].as_u64().unwrap_or_default();
    let range = if index == 0 { "1-20" } else { "21-40" };
    Json(json!({
        "status": "success",
        "total_batches": 2,
        "current_batch_idx": index,
        "current_range": range,
        "data": [
            {"fragment_id": 11, "book_id": 7, "content": "总则正文", "is_embedded": 1,
             "L1": "总则", "combo_title": "总则", "source_segment_range": "1-20"},
            {"fragment_id": 12, "book_id": 7, "content": null, "is_embedded": 0,
             "L1": "总则", "L2": "用法", "combo_title": null}
        ]
    }))
}

async fn audit_embed(Json(body): Json<Value>) -> Json<Value> {
    let count = body["fragment_ids"].as_array().map(Vec::len).unwrap_or_default();
    Json(json!({"status": "success", "msg": format!("embedded {}", count)}))
}

async fn tool_search(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": [{"id": "r1", "source": "药典 | 二部", "path": "二部 > 片剂",
                  "content": body["keyword"], "raw_score": 0.9, "score": "90.0%"}]
    }))
}

async fn level_lookup(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "total_candidates_scanned": 57,
        "returned_count": 1,
        "data": [{"id": 8, "content": body["search_content"], "score": 0.42, "score_percent": "42.0%",
                  "source_collection": "Pharmacopoeia_Official",
                  "metadata": {"组合标题": body["title_filter"], "来源文件": "药典.docx"}}]
    }))
}

async fn config_get(
    State(server): State<FakeServer>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    if query.get("key").map(String::as_str) != Some("search_collections") {
        return Json(json!({"status": "success", "data": null}));
    }
    Json(json!({"status": "success", "data": server.config.lock().clone()}))
}

async fn config_save(State(server): State<FakeServer>, Json(body): Json<Value>) -> Json<Value> {
    *server.config.lock() = body["value"].clone();
    Json(json!({"status": "success", "msg": "saved"}))
}

async fn system_logs(State(server): State<FakeServer>) -> Json<Value> {
    if server.last_write.lock()["cleared"] == true {
        return Json(json!({"status": "success", "data": []}));
    }
    Json(json!({
        "status": "success",
        "data": [
            {"log_type": "error", "source": "kimi", "message": "timeout", "create_time": "2024-05-01 10:00"},
            {"log_type": "info", "source": null, "message": "started", "create_time": null}
        ]
    }))
}

async fn system_logs_clear(State(server): State<FakeServer>) -> Json<Value> {
    server.record(json!({"cleared": true}));
    Json(json!({"status": "success"}))
}

async fn review_history() -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": {
            "dingchun": [
                {"review_result": "通过", "review_time": "2024-05-01 10:00", "review_content": "new"},
                {"review_result": "驳回", "review_time": "2024-04-01 10:00", "review_content": "old"}
            ],
            "qwen": [],
            "legacy_bot": [{"review_result": "通过", "review_content": "ignored"}]
        }
    }))
}

async fn batch_start(State(server): State<FakeServer>, Json(body): Json<Value>) -> Json<Value> {
    let start = body["start_id"].as_u64().unwrap_or_default();
    let end = body["end_id"].as_u64().unwrap_or_default();
    server.batch_total.store(end + 1 - start, Ordering::SeqCst);
    Json(json!({"status": "success", "msg": "started"}))
}

async fn batch_stop(State(server): State<FakeServer>) -> Json<Value> {
    server.batch_total.store(0, Ordering::SeqCst);
    Json(json!({"status": "success"}))
}

async fn batch_progress(
    State(server): State<FakeServer>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let page = query.get("page").cloned().unwrap_or_default();
    Json(json!({
        "status": "success",
        "total": server.batch_total.load(Ordering::SeqCst),
        "stats": {"qwen": 4, "kimi": 2},
        "rows": [{"question_id": 1, "stem_preview": format!("page {}", page), "qwen_status": "DONE", "kimi_status": "DOING"}]
    }))
}

fn router(server: FakeServer) -> Router {
    Router::new()
        .route("/api/smart_compare/process", post(compare))
        .route("/api/smart_compare/get_book_content", post(book_content))
        .route("/api/import/task/run", post(import_run))
        .route("/api/import/book/list", post(book_list))
        .route("/api/import/book/save", post(book_save))
        .route("/api/data/question/list", post(question_list_by_id))
        .route("/api/data/question/manage", post(question_manage))
        .route("/api/data/review/history", post(review_history))
        .route("/api/tool/review", post(review))
        .route("/api/generate/question", post(generate))
        .route("/api/batch/start", post(batch_start))
        .route("/api/batch/stop", post(batch_stop))
        .route("/api/batch/progress", get(batch_progress))
        .route("/api/knowledge/collections", get(knowledge_collections))
        .route("/api/knowledge/overview", get(knowledge_overview))
        .route("/api/knowledge/query", post(knowledge_query))
        .route("/api/knowledge/save", post(record_write))
        .route("/api/knowledge/delete", post(knowledge_delete))
        .route("/api/audit/ranges", post(audit_ranges))
        .route("/api/audit/list", post(audit_list))
        .route("/api/audit/save_fragment", post(record_write))
        .route("/api/audit/delete_fragment", post(record_write))
        .route("/api/audit/embed_batch", post(audit_embed))
        .route("/api/tool/search", post(tool_search))
        .route("/api/tool/level_lookup", post(level_lookup))
        .route("/api/tool/update_rag", post(record_write))
        .route("/api/config/get", get(config_get))
        .route("/api/config/save", post(config_save))
        .route("/api/system/logs", get(system_logs))
        .route("/api/system/logs/clear", post(system_logs_clear))
        .with_state(server)
}

async fn start_server() -> TestServer {
    start_server_with(FakeServer::default()).await
}

async fn start_server_with(server: FakeServer) -> TestServer {
    TestServer::start(router(server))
        .await
        .expect("Failed to start test server")
}

async fn collect(mut events: EventStream) -> Vec<ApplicationEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.next().await {
        out.push(event.expect("stream failed"));
    }
    out
}

/// Region that records effects as text
#[derive(Default)]
struct TextRegion {
    lines: Vec<String>,
}

impl Region for TextRegion {
    fn clear_placeholder(&mut self) {
        self.lines.push("[clear]".into());
    }
    fn append_line(&mut self, pane: Pane, text: &str) {
        self.lines.push(format!("{:?}: {}", pane, text));
    }
    fn append_result(&mut self, index: usize, unit: ResultUnit<'_>) {
        let text = match unit {
            ResultUnit::Comparison(record) => record.segment_content.clone(),
            ResultUnit::Question(question) => question.stem.clone(),
        };
        self.lines.push(format!("#{} {}", index, text));
    }
    fn append_error(&mut self, message: &str) {
        self.lines.push(format!("error: {}", message));
    }
    fn show_success(&mut self, message: &str) {
        self.lines.push(format!("success: {}", message));
    }
    fn set_status(&mut self, status: &RenderStatus) {
        self.lines.push(format!("[{}]", status));
    }
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn test_compare_stream() {
    let server = start_server().await;
    let mut events = server.client.compare("每片含0.5g，口服").await.unwrap();

    let mut records = Vec::new();
    while let Some(event) = events.next().await {
        match event.unwrap() {
            ApplicationEvent::Record(record) => records.push(record),
            other => panic!("unexpected event {:?}", other),
        }
    }

    // Malformed line dropped, unterminated last line discarded
    assert_eq!(records.len(), 2);
    assert_eq!(events.dropped_frames(), 1);
    assert_eq!(records[0].segment_content, "每片含0.5g");
    assert_eq!(records[1].retrieved_fragments[0].source_title(), "药典");
    assert_eq!(records[1].retrieved_fragments[0].score_display(), "91.0%");
}

#[tokio::test]
async fn test_compare_rejected_before_streaming() {
    let server = start_server().await;
    let err = server.client.compare("").await.unwrap_err();
    match err {
        QbankClientError::Stream(StreamError::Server { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("text is empty"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_import_split_renders_log_and_outcome() {
    let server = start_server().await;
    let events = server.client.run_import(ImportStep::Split, 7).await.unwrap();

    let mut region = TextRegion::default();
    let summary = render_stream(events, &mut region).await;

    assert_eq!(
        region.lines,
        vec![
            "[clear]",
            "Log: reading file",
            "Log: split 12 segments",
            "success: 12 segments",
            "[completed, 0 items]",
        ]
    );
    assert!(summary.is_success());
    assert!(summary.outcome.is_some());
}

#[tokio::test]
async fn test_import_failure_outcome() {
    let server = start_server().await;
    let events = server.client.run_import(ImportStep::Process, 7).await.unwrap();

    let mut region = TextRegion::default();
    let summary = render_stream(events, &mut region).await;

    assert!(region.lines.contains(&"error: book not found".to_string()));
    assert!(!summary.is_success());
    assert_eq!(summary.termination, Termination::Completed);
}

#[tokio::test]
async fn test_import_server_error() {
    let server = start_server().await;
    let result = server.client.run_import(ImportStep::Embed, 7).await;
    assert!(matches!(
        result,
        Err(QbankClientError::Stream(StreamError::Server { status: 500, .. }))
    ));
}

#[tokio::test]
async fn test_generate_sse_stops_at_done() {
    let server = start_server().await;
    let events = server
        .client
        .generate(&GenerationRequest::new("阿司匹林"))
        .await
        .unwrap();

    let mut region = TextRegion::default();
    let summary = render_stream(events, &mut region).await;

    assert_eq!(
        region.lines,
        vec![
            "[clear]",
            "Log: 正在检索知识库",
            "Snippet: 片段一",
            "Log: 已生成第1题",
            "#0 下列说法正确的是",
            "[completed]",
        ]
    );
    assert_eq!(summary.termination, Termination::Done);
    assert_eq!(summary.questions.len(), 1);

    let options = summary.questions[0].options();
    assert_eq!(options.len(), 2);
    assert!(options[0].2);
}

#[tokio::test]
async fn test_generate_tolerates_null_fields() {
    let server = start_server().await;
    let events = server
        .client
        .generate(&GenerationRequest::new("sparse"))
        .await
        .unwrap();
    let events = collect(events).await;

    assert_eq!(events.len(), 3);
    assert_eq!(events[0], ApplicationEvent::Snippet("片段".into()));
    match &events[1] {
        ApplicationEvent::Completion(completion) => {
            let question = completion.question.as_ref().expect("question kept");
            assert_eq!(question.stem, "");
            assert_eq!(question.options().len(), 1);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(events[2], ApplicationEvent::Done);
}

#[tokio::test]
async fn test_stream_events_in_order() {
    let server = start_server().await;
    let events = server.client.review_stream(12).await.unwrap();
    let events = collect(events).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], ApplicationEvent::Log("retrieving".into()));
    match &events[1] {
        ApplicationEvent::Outcome(outcome) => {
            let record = outcome.to_review_record().unwrap();
            assert_eq!(record.review_result, "通过");
            assert_eq!(record.rag_index.as_deref(), Some("ctx-1"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

// =============================================================================
// Envelope endpoints
// =============================================================================

#[tokio::test]
async fn test_list_books() {
    let server = start_server().await;
    let books = tokio_test::assert_ok!(server.client.list_books().await);
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].book_id, 7);
    assert_eq!(books[0].split_percent(), 25);
    assert_eq!(books[0].embed_percent(), 0);
}

#[tokio::test]
async fn test_save_book_envelope_error() {
    let server = start_server().await;

    let saved = server.client.save_book(&BookDraft::new("Atlas", "/data/a.docx")).await;
    assert_eq!(saved.unwrap().as_deref(), Some("saved"));

    let err = server.client.save_book(&BookDraft::new("", "/x")).await.unwrap_err();
    assert!(matches!(err, QbankClientError::Api(msg) if msg == "name required"));
}

#[tokio::test]
async fn test_book_content() {
    let server = start_server().await;
    let text = server.client.get_book_content(7, 10, 20).await.unwrap();
    assert_eq!(text, "rows 10-20");
}

#[tokio::test]
async fn test_questions() {
    let server = start_server().await;
    let query = QuestionQuery {
        page: 2,
        ..Default::default()
    };
    let page = server.client.list_questions(&query).await.unwrap();
    assert_eq!(page.page, 2);
    assert_eq!(page.data[0].status_for(Reviewer::Qwen), Some("通过"));
    assert_eq!(page.data[0].status_for(Reviewer::Kimi), None);

    tokio_test::assert_ok!(server.client.delete_question(3).await);
    let err = server.client.delete_question(404).await.unwrap_err();
    assert!(matches!(err, QbankClientError::Api(msg) if msg == "no such question"));
}

#[tokio::test]
async fn test_review_history_session() {
    let server = start_server().await;
    let mut session = ReviewSession::new(12);
    server.client.refresh_session(&mut session).await.unwrap();

    assert_eq!(session.history(Reviewer::Dingchun).len(), 2);
    assert_eq!(session.latest(Reviewer::Dingchun).unwrap().review_content, "new");
    assert_eq!(session.select(Reviewer::Dingchun, 1).unwrap().review_content, "old");
    assert!(session.latest(Reviewer::Qwen).is_none());
    assert!(session.history(Reviewer::Doubao).is_empty());
}

#[tokio::test]
async fn test_non_streamed_review() {
    let server = start_server().await;

    let record = server.client.review(Reviewer::Qwen, 12).await.unwrap();
    assert_eq!(record.review_result, "驳回");
    assert_eq!(record.review_content, "option C is wrong");

    let err = server.client.review(Reviewer::Kimi, 12).await.unwrap_err();
    assert!(matches!(err, QbankClientError::Api(msg) if msg == "reviewer offline"));

    assert!(server.client.review(Reviewer::Dingchun, 12).await.is_err());
}

// =============================================================================
// Batch review
// =============================================================================

#[tokio::test]
async fn test_batch_progress_paging() {
    let server = start_server().await;
    let progress = server.client.batch_progress(3, 20).await.unwrap();
    assert_eq!(progress.total, 0);
    assert_eq!(progress.max_done(), 4);
    assert_eq!(progress.rows[0].stem_preview.as_deref(), Some("page 3"));
    assert_eq!(
        progress.rows[0].state_for(Reviewer::Kimi),
        qbank_client::TaskState::Doing
    );
}

#[tokio::test]
async fn test_batch_monitor_lifecycle() {
    let server = start_server().await;
    let monitor = BatchMonitor::new(
        server.client.clone(),
        PollConfig {
            interval: Duration::from_millis(50),
            page_size: 20,
        },
    );

    monitor.load().await;
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert!(!monitor.has_live_timer());

    let request = BatchStartRequest {
        start_id: 1,
        end_id: 45,
        ai_list: vec![Reviewer::Qwen, Reviewer::Kimi],
    };
    monitor.start(&request).await.unwrap();
    assert_eq!(monitor.state(), MonitorState::Active);
    assert!(monitor.has_live_timer());

    let mut snapshots = monitor.subscribe();
    snapshots.changed().await.unwrap();
    assert_eq!(snapshots.borrow().total, 45);

    assert!(monitor.next_page().await);
    assert_eq!(monitor.page(), 2);

    monitor.stop().await.unwrap();
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert!(!monitor.has_live_timer());
}

// =============================================================================
// Question import and edit
// =============================================================================

#[tokio::test]
async fn test_add_questions() {
    let server = start_server().await;

    let reply = server.client.add_questions("1. 下列...", "智能审题").await.unwrap();
    assert_eq!(reply.count, Some(2));
    assert_eq!(reply.msg.as_deref(), Some("入库成功"));

    let err = server.client.add_questions("", "智能审题").await.unwrap_err();
    assert!(matches!(err, QbankClientError::Api(msg) if msg == "内容不能为空"));
}

#[tokio::test]
async fn test_update_question_keeps_stored_options() {
    let fake = FakeServer::default();
    let server = start_server_with(fake.clone()).await;

    let stored = server.client.find_question(3).await.unwrap().expect("question 3");
    assert_eq!(stored.stem, "Q3");
    assert!(server.client.find_question(4).await.unwrap().is_none());

    let mut edit = QuestionEdit::from_summary(&stored);
    edit.stem = "Q3 revised".into();
    edit.set_option('C', "丙").unwrap();
    tokio_test::assert_ok!(server.client.update_question(&edit).await);

    let sent = fake.last_write.lock().clone();
    assert_eq!(sent["action"], "update");
    assert_eq!(
        sent["payload"],
        json!({
            "question_id": 3, "stem": "Q3 revised", "answer": "A", "analysis": null,
            "option_a": "甲", "option_b": "乙", "option_c": "丙"
        })
    );
}

// =============================================================================
// Knowledge base, audit and search
// =============================================================================

#[tokio::test]
async fn test_knowledge_collections_and_overview() {
    let server = start_server().await;

    let names = server.client.knowledge_collections().await.unwrap();
    assert_eq!(names, vec!["Pharmacopoeia_Official", "Guidelines"]);

    let overview = server.client.knowledge_overview().await.unwrap();
    assert_eq!(overview.len(), 2);
    assert_eq!(overview[0].sources[1].name, "附录.docx");
    assert!(overview[0].is_readable());
    assert!(!overview[1].is_readable());
    assert!(overview[1].sources.is_empty());
}

#[tokio::test]
async fn test_knowledge_query_page() {
    let server = start_server().await;

    let mut query = KnowledgeQuery {
        page: 2,
        ..Default::default()
    };
    query.filters.insert("L1".into(), "二部".into());
    let page = server.client.query_knowledge(&query).await.unwrap();
    assert_eq!(page.page, 2);
    assert_eq!(page.total, 21);

    let doc = &page.data[0];
    assert_eq!(doc.plain_content(), "每片0.5g");
    assert_eq!(doc.heading(), "二部 / 片剂");
    assert_eq!(doc.combo_title(), "片剂 / 二部");
    assert_eq!(doc.metadata["filter_echo"], "二部");

    let missing = KnowledgeQuery {
        collection_name: "Missing".into(),
        ..Default::default()
    };
    let err = server.client.query_knowledge(&missing).await.unwrap_err();
    assert!(matches!(err, QbankClientError::Api(msg) if msg == "collection not found"));
}

#[tokio::test]
async fn test_knowledge_save_and_delete() {
    let fake = FakeServer::default();
    let server = start_server_with(fake.clone()).await;

    let mut draft = KnowledgeDraft::new(DEFAULT_COLLECTION, "每片0.5g", "药典.docx", &["二部", "片剂"]);
    draft.doc_id = Some("doc-1".into());
    tokio_test::assert_ok!(server.client.save_knowledge(&draft).await);

    let sent = fake.last_write.lock().clone();
    assert_eq!(sent["doc_id"], "doc-1");
    assert_eq!(sent["metadata_raw"]["组合标题"], "片剂 / 二部");
    assert_eq!(sent["metadata_raw"]["L2"], "片剂");

    tokio_test::assert_ok!(server.client.delete_knowledge(DEFAULT_COLLECTION, "doc-1").await);
    let err = server
        .client
        .delete_knowledge(DEFAULT_COLLECTION, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, QbankClientError::Api(msg) if msg == "not found"));
}

#[tokio::test]
async fn test_audit_fragments() {
    let fake = FakeServer::default();
    let server = start_server_with(fake.clone()).await;

    assert_eq!(server.client.audit_ranges(7).await.unwrap(), vec!["1-20", "21-40"]);
    assert!(server.client.audit_ranges(8).await.unwrap().is_empty());

    let batch = server.client.audit_fragments(7, 1).await.unwrap();
    assert_eq!(batch.total_batches, 2);
    assert_eq!(batch.current_batch_idx, 1);
    assert_eq!(batch.current_range.as_deref(), Some("21-40"));
    assert!(batch.data[0].is_embedded);
    assert!(!batch.data[1].is_embedded);
    assert_eq!(batch.data[1].content, "");
    assert_eq!(batch.data[1].levels(), vec!["总则", "用法"]);

    let mut draft = FragmentDraft::new(7, "改写后的正文", &batch.data[1].levels());
    draft.fragment_id = Some(12);
    tokio_test::assert_ok!(server.client.save_fragment(&draft).await);
    let sent = fake.last_write.lock().clone();
    assert_eq!(sent["fragment_id"], 12);
    assert_eq!(sent["L2"], "用法");
    assert_eq!(sent["combo_title"], "用法 / 总则");

    tokio_test::assert_ok!(server.client.delete_fragment(12).await);
    assert_eq!(fake.last_write.lock()["fragment_id"], 12);

    let message = server.client.embed_fragments(&[11, 12]).await.unwrap();
    assert_eq!(message.as_deref(), Some("embedded 2"));
    assert!(server.client.embed_fragments(&[]).await.is_err());
}

#[tokio::test]
async fn test_search_and_level_lookup() {
    let fake = FakeServer::default();
    let server = start_server_with(fake.clone()).await;

    let results = server.client.search_knowledge("阿司匹林").await.unwrap();
    assert_eq!(results.total_candidates_scanned, None);
    let hit = &results.data[0];
    assert_eq!(hit.content, "阿司匹林");
    assert_eq!(hit.display_score(), "90.0%");
    assert_eq!(hit.display_source(), "药典 | 二部");

    let results = server.client.level_lookup("片剂", "").await.unwrap();
    assert_eq!(results.total_candidates_scanned, Some(57));
    let hit = &results.data[0];
    assert_eq!(hit.id, "8");
    assert_eq!(hit.content, " ");
    assert_eq!(hit.display_source(), "药典.docx | 片剂");
    assert_eq!(hit.display_path(), "路径未知");

    tokio_test::assert_ok!(server.client.update_knowledge_item("r1", "新正文").await);
    assert_eq!(*fake.last_write.lock(), json!({"id": "r1", "content": "新正文"}));
}

// =============================================================================
// Configuration and system logs
// =============================================================================

#[tokio::test]
async fn test_search_collections_config() {
    let fake = FakeServer::default();
    let server = start_server_with(fake.clone()).await;

    assert!(server.client.search_collections().await.unwrap().is_empty());
    assert_eq!(server.client.get_config("other").await.unwrap(), None);

    *fake.config.lock() = json!("['Pharmacopoeia_Official', 'Guidelines']");
    assert_eq!(
        server.client.search_collections().await.unwrap(),
        vec!["Pharmacopoeia_Official", "Guidelines"]
    );

    let chosen = vec!["Guidelines".to_string()];
    tokio_test::assert_ok!(server.client.set_search_collections(&chosen).await);
    assert_eq!(*fake.config.lock(), json!(["Guidelines"]));
    assert_eq!(server.client.search_collections().await.unwrap(), chosen);
}

#[tokio::test]
async fn test_system_logs() {
    let server = start_server().await;

    let logs = server.client.system_logs().await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs[0].is_error());
    assert_eq!(logs[1].source, "");
    assert_eq!(logs[1].create_time, "");

    tokio_test::assert_ok!(server.client.clear_system_logs().await);
    assert!(server.client.system_logs().await.unwrap().is_empty());
}
