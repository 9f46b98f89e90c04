//! Request and response types for the question-bank server

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{QbankClientError, Result};

/// Deserialize `null` like a missing field.
///
/// The server serializes absent database columns and model fields as `null`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Envelope
// =============================================================================

/// Uniform JSON envelope returned by every non-streaming endpoint.
///
/// Only `status` is checked; the rest of the body is taken as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    pub data: Option<T>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Unwrap the payload, turning a non-success status into [`QbankClientError::Api`]
    pub fn into_data(self) -> Result<Option<T>> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(QbankClientError::Api(
                self.msg.unwrap_or_else(|| format!("status {}", self.status)),
            ))
        }
    }
}

/// Envelope for endpoints that only acknowledge an action
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    pub status: String,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
}

impl Ack {
    pub fn into_result(self) -> Result<Option<String>> {
        if self.status == "success" {
            Ok(self.msg)
        } else {
            Err(QbankClientError::Api(
                self.msg.unwrap_or_else(|| format!("status {}", self.status)),
            ))
        }
    }
}

// =============================================================================
// Reviewers
// =============================================================================

/// AI reviewer backends known to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reviewer {
    Dingchun,
    Qwen,
    Kimi,
    Doubao,
}

impl Reviewer {
    pub const ALL: [Reviewer; 4] = [
        Reviewer::Dingchun,
        Reviewer::Qwen,
        Reviewer::Kimi,
        Reviewer::Doubao,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Reviewer::Dingchun => "dingchun",
            Reviewer::Qwen => "qwen",
            Reviewer::Kimi => "kimi",
            Reviewer::Doubao => "doubao",
        }
    }

    /// Only dingchun answers a review request with a log stream
    pub fn is_streamed(&self) -> bool {
        matches!(self, Reviewer::Dingchun)
    }
}

impl fmt::Display for Reviewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reviewer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dingchun" => Ok(Reviewer::Dingchun),
            "qwen" => Ok(Reviewer::Qwen),
            "kimi" => Ok(Reviewer::Kimi),
            "doubao" => Ok(Reviewer::Doubao),
            other => Err(format!(
                "unknown reviewer '{}' (expected dingchun, qwen, kimi or doubao)",
                other
            )),
        }
    }
}

// =============================================================================
// Books
// =============================================================================

/// Import step run against a book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStep {
    /// Mechanical split into segments
    Split,
    /// AI structuring of segments into fragments
    Process,
    /// Embedding fragments into the vector store
    Embed,
}

impl ImportStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStep::Split => "split",
            ImportStep::Process => "process",
            ImportStep::Embed => "embed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImportStep::Split => "mechanical split",
            ImportStep::Process => "AI structuring",
            ImportStep::Embed => "vector import",
        }
    }
}

impl FromStr for ImportStep {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "split" => Ok(ImportStep::Split),
            "process" => Ok(ImportStep::Process),
            "embed" => Ok(ImportStep::Embed),
            other => Err(format!(
                "unknown import step '{}' (expected split, process or embed)",
                other
            )),
        }
    }
}

/// A book registered for import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub book_id: i64,
    pub book_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_path: String,
    #[serde(default)]
    pub target_collection: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_segments: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub processed_segments: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_fragments: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub imported_fragments: u64,
}

impl Book {
    /// Split progress in whole percent (0 when nothing was split yet)
    pub fn split_percent(&self) -> u64 {
        percent(self.processed_segments, self.total_segments)
    }

    /// Embedding progress in whole percent (0 when there are no fragments)
    pub fn embed_percent(&self) -> u64 {
        percent(self.imported_fragments, self.total_fragments)
    }
}

fn percent(done: u64, total: u64) -> u64 {
    if total == 0 {
        0
    } else {
        ((done as f64 / total as f64) * 100.0).round() as u64
    }
}

/// Create-or-update payload for a book
#[derive(Debug, Clone, Serialize)]
pub struct BookDraft {
    pub book_id: Option<i64>,
    pub book_name: String,
    pub file_path: String,
    pub target_collection: String,
    pub batch_size: u32,
}

impl BookDraft {
    pub fn new(book_name: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            book_id: None,
            book_name: book_name.into(),
            file_path: file_path.into(),
            target_collection: "Pharmacopoeia".to_string(),
            batch_size: 5,
        }
    }
}

// =============================================================================
// Questions
// =============================================================================

/// One row of the question list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub question_id: i64,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stem: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub case_content: Option<String>,
    #[serde(default)]
    pub options_display: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub status_dingchun: Option<String>,
    #[serde(default)]
    pub status_qwen: Option<String>,
    #[serde(default)]
    pub status_kimi: Option<String>,
    #[serde(default)]
    pub status_doubao: Option<String>,
    /// `option_a`..`option_l` and the remaining columns
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl QuestionSummary {
    /// Last review label for a reviewer, if it ever ran
    pub fn status_for(&self, reviewer: Reviewer) -> Option<&str> {
        match reviewer {
            Reviewer::Dingchun => self.status_dingchun.as_deref(),
            Reviewer::Qwen => self.status_qwen.as_deref(),
            Reviewer::Kimi => self.status_kimi.as_deref(),
            Reviewer::Doubao => self.status_doubao.as_deref(),
        }
    }
}

/// Paged question list
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionPage {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Vec<QuestionSummary>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total: u64,
}

/// Query for the question list
#[derive(Debug, Clone, Serialize)]
pub struct QuestionQuery {
    pub page: u32,
    pub page_size: u32,
    pub search_text: String,
}

/// Reply of the AI question import
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionImport {
    pub status: String,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    /// Number of questions stored
    #[serde(default)]
    pub count: Option<u64>,
}

impl QuestionImport {
    pub fn into_result(self) -> Result<Self> {
        if self.status == "success" {
            Ok(self)
        } else {
            Err(QbankClientError::Api(
                self.msg.unwrap_or_else(|| format!("status {}", self.status)),
            ))
        }
    }
}

/// Full replacement of a question's text fields.
///
/// The server overwrites every option column, so an edit starts from the
/// stored question and only changes what is set on it.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionEdit {
    pub question_id: i64,
    pub stem: String,
    pub answer: Option<String>,
    pub analysis: Option<String>,
    #[serde(flatten)]
    options: BTreeMap<String, String>,
}

impl QuestionEdit {
    pub fn new(question_id: i64, stem: impl Into<String>) -> Self {
        Self {
            question_id,
            stem: stem.into(),
            answer: None,
            analysis: None,
            options: BTreeMap::new(),
        }
    }

    /// Start from a stored question
    pub fn from_summary(question: &QuestionSummary) -> Self {
        let options = OPTION_KEYS
            .iter()
            .filter_map(|key| {
                let field = format!("option_{}", key);
                let text = question.extra.get(&field)?.as_str()?;
                (!text.is_empty()).then(|| (field, text.to_string()))
            })
            .collect();
        Self {
            question_id: question.question_id,
            stem: question.stem.clone(),
            answer: question.answer.clone(),
            analysis: question.analysis.clone(),
            options,
        }
    }

    /// Set option `A`..`L`; empty text removes it
    pub fn set_option(&mut self, letter: char, text: &str) -> std::result::Result<(), String> {
        let key = letter.to_ascii_lowercase();
        if !OPTION_KEYS.contains(&key) {
            return Err(format!("unknown option '{}' (expected A to L)", letter));
        }
        let field = format!("option_{}", key);
        if text.is_empty() {
            self.options.remove(&field);
        } else {
            self.options.insert(field, text.to_string());
        }
        Ok(())
    }

    /// Options as `(letter, text)` in letter order
    pub fn options(&self) -> Vec<(char, &str)> {
        OPTION_KEYS
            .iter()
            .filter_map(|key| {
                let text = self.options.get(&format!("option_{}", key))?;
                Some((key.to_ascii_uppercase(), text.as_str()))
            })
            .collect()
    }
}

impl Default for QuestionQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            search_text: String::new(),
        }
    }
}

// =============================================================================
// System configuration and logs
// =============================================================================

/// Config key holding the collections searched during reviews
pub const SEARCH_COLLECTIONS_KEY: &str = "search_collections";

/// Read a stored collection list.
///
/// The value is a JSON array, or a string holding one (possibly with single
/// quotes), or a single collection name.
pub fn collection_list(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        serde_json::Value::String(s) if s.trim().is_empty() => Vec::new(),
        serde_json::Value::String(s) => {
            let quoted = s.replace('\'', "\"");
            serde_json::from_str::<Vec<String>>(&quoted).unwrap_or_else(|_| vec![s.clone()])
        }
        _ => Vec::new(),
    }
}

/// One entry of the server's error log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLog {
    #[serde(default, deserialize_with = "null_as_default")]
    pub log_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub create_time: String,
}

impl SystemLog {
    pub fn is_error(&self) -> bool {
        self.log_type == "error"
    }
}

// =============================================================================
// Reviews
// =============================================================================

/// Verdict classes the server's review labels map to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewVerdict {
    Pass,
    Fail,
    NeedsManualCheck,
}

impl ReviewVerdict {
    /// Map a server label ("通过", "驳回", ...) to a verdict; unknown labels need a human
    pub fn from_label(label: &str) -> Self {
        match label {
            "通过" => ReviewVerdict::Pass,
            "驳回" => ReviewVerdict::Fail,
            _ => ReviewVerdict::NeedsManualCheck,
        }
    }
}

/// A stored review result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub review_result: String,
    #[serde(default)]
    pub review_time: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub review_content: String,
    #[serde(default)]
    pub rag_index: Option<String>,
}

impl ReviewRecord {
    pub fn verdict(&self) -> ReviewVerdict {
        ReviewVerdict::from_label(&self.review_result)
    }
}

/// Review history for one question, newest record first per reviewer
pub type ReviewHistory = BTreeMap<Reviewer, Vec<ReviewRecord>>;

/// Reply of a non-streamed review (qwen, kimi, doubao)
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewReply {
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
}

impl ReviewReply {
    pub fn into_record(self) -> Result<ReviewRecord> {
        if self.status == "success" {
            Ok(ReviewRecord {
                review_result: self.result.unwrap_or_default(),
                review_time: None,
                review_content: self.content.unwrap_or_default(),
                rag_index: None,
            })
        } else {
            Err(QbankClientError::Api(
                self.msg.unwrap_or_else(|| format!("status {}", self.status)),
            ))
        }
    }
}

/// Request-scoped review state for one question.
///
/// Holds the question being reviewed and its history, so nothing about the
/// "current question" lives in process-wide state.
#[derive(Debug, Clone, Default)]
pub struct ReviewSession {
    pub question_id: i64,
    history: ReviewHistory,
}

impl ReviewSession {
    pub fn new(question_id: i64) -> Self {
        Self {
            question_id,
            history: ReviewHistory::new(),
        }
    }

    /// Replace the cached history with a freshly fetched one
    pub fn set_history(&mut self, history: ReviewHistory) {
        self.history = history;
    }

    pub fn history(&self, reviewer: Reviewer) -> &[ReviewRecord] {
        self.history
            .get(&reviewer)
            .map(|records| records.as_slice())
            .unwrap_or(&[])
    }

    /// Most recent record for a reviewer
    pub fn latest(&self, reviewer: Reviewer) -> Option<&ReviewRecord> {
        self.history(reviewer).first()
    }

    /// Pick a historic record by position (0 = latest)
    pub fn select(&self, reviewer: Reviewer, index: usize) -> Option<&ReviewRecord> {
        self.history(reviewer).get(index)
    }
}

// =============================================================================
// Question generation
// =============================================================================

/// Parameters for the question generation stream
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub topic: String,
    pub has_case: bool,
    pub correct_count: u32,
    pub question_count: u32,
    /// Number of options per question
    pub total_count: u32,
}

impl GenerationRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            has_case: true,
            correct_count: 1,
            question_count: 1,
            total_count: 5,
        }
    }
}

const OPTION_KEYS: [char; 12] = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l'];

/// A question produced by the generator.
///
/// Options come as `option_a` .. `option_l`; everything is kept so the
/// question can be sent back verbatim when saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    #[serde(default)]
    pub case_content: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stem: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GeneratedQuestion {
    /// Present options as `(letter, text, is_correct)` in letter order
    pub fn options(&self) -> Vec<(char, String, bool)> {
        let answer = self.answer.as_deref().unwrap_or_default();
        OPTION_KEYS
            .iter()
            .filter_map(|key| {
                let text = self.extra.get(&format!("option_{}", key))?.as_str()?;
                if text.is_empty() {
                    return None;
                }
                let letter = key.to_ascii_uppercase();
                Some((letter, text.to_string(), answer.contains(letter)))
            })
            .collect()
    }
}

// =============================================================================
// Batch review
// =============================================================================

/// Request to start a batch review over a question id range
#[derive(Debug, Clone, Serialize)]
pub struct BatchStartRequest {
    pub start_id: i64,
    pub end_id: i64,
    pub ai_list: Vec<Reviewer>,
}

/// Per-reviewer state of one question in a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum TaskState {
    #[default]
    Wait,
    Doing,
    Done,
    Error,
    Skip,
}

impl From<String> for TaskState {
    /// Unknown states render as waiting
    fn from(value: String) -> Self {
        match value.as_str() {
            "DOING" => TaskState::Doing,
            "DONE" => TaskState::Done,
            "ERROR" => TaskState::Error,
            "SKIP" => TaskState::Skip,
            _ => TaskState::Wait,
        }
    }
}

impl TaskState {
    pub fn label(&self) -> &'static str {
        match self {
            TaskState::Wait => "waiting",
            TaskState::Doing => "running",
            TaskState::Done => "done",
            TaskState::Error => "error",
            TaskState::Skip => "-",
        }
    }
}

/// One row of the batch progress table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRow {
    pub question_id: i64,
    #[serde(default)]
    pub stem_preview: Option<String>,
    #[serde(default)]
    pub dingchun_status: Option<TaskState>,
    #[serde(default)]
    pub qwen_status: Option<TaskState>,
    #[serde(default)]
    pub kimi_status: Option<TaskState>,
    #[serde(default)]
    pub doubao_status: Option<TaskState>,
}

impl ProgressRow {
    pub fn state_for(&self, reviewer: Reviewer) -> TaskState {
        let state = match reviewer {
            Reviewer::Dingchun => self.dingchun_status,
            Reviewer::Qwen => self.qwen_status,
            Reviewer::Kimi => self.kimi_status,
            Reviewer::Doubao => self.doubao_status,
        };
        state.unwrap_or_default()
    }
}

/// Batch progress snapshot returned by the progress endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub stats: BTreeMap<Reviewer, u64>,
    #[serde(default)]
    pub rows: Vec<ProgressRow>,
}

impl BatchProgress {
    /// Completed count of the reviewer furthest ahead
    pub fn max_done(&self) -> u64 {
        self.stats.values().copied().max().unwrap_or(0)
    }

    /// Number of pages for a page size, never less than one
    pub fn page_count(&self, page_size: u32) -> u32 {
        page_count(self.total, page_size)
    }
}

pub(crate) fn page_count(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 1;
    }
    let pages = total.div_ceil(u64::from(page_size));
    u32::try_from(pages.max(1)).unwrap_or(u32::MAX)
}
