//! Types for streaming responses

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{null_as_default, GeneratedQuestion, ReviewRecord};

// =============================================================================
// Application events
// =============================================================================

/// One decoded frame of a streaming response.
///
/// Replaces the server's `LOG: ` / `DATA: ` prefixes and SSE `type` tags with
/// a single tagged type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ApplicationEvent {
    /// Human-readable status line of a prefixed-log stream
    Log(String),
    /// One comparison result of the NDJSON stream
    Record(Box<ComparisonRecord>),
    /// Terminal result of a prefixed-log stream
    Outcome(TaskOutcome),
    /// Agent progress text of the generation stream
    Process(String),
    /// Retrieved knowledge snippet of the generation stream
    Snippet(String),
    /// Error reported inside a healthy stream
    Failure(String),
    /// A finished question of the generation stream
    Completion(Completion),
    /// `[DONE]` sentinel of the generation stream
    Done,
}

impl ApplicationEvent {
    /// Events after which the server sends nothing meaningful
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationEvent::Outcome(_) | ApplicationEvent::Done)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApplicationEvent::Log(_) => "log",
            ApplicationEvent::Record(_) => "record",
            ApplicationEvent::Outcome(_) => "outcome",
            ApplicationEvent::Process(_) => "process",
            ApplicationEvent::Snippet(_) => "snippet",
            ApplicationEvent::Failure(_) => "failure",
            ApplicationEvent::Completion(_) => "completion",
            ApplicationEvent::Done => "done",
        }
    }
}

// =============================================================================
// Smart compare records (NDJSON)
// =============================================================================

/// Consistency verdict for one compared segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ConsistencyStatus {
    FullyConsistent,
    SemanticallyConsistent,
    /// Conflicting or unsupported by the knowledge base; also the fallback
    #[default]
    Error,
}

impl From<String> for ConsistencyStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "fully_consistent" => ConsistencyStatus::FullyConsistent,
            "semantically_consistent" => ConsistencyStatus::SemanticallyConsistent,
            _ => ConsistencyStatus::Error,
        }
    }
}

impl ConsistencyStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConsistencyStatus::FullyConsistent => "fully consistent",
            ConsistencyStatus::SemanticallyConsistent => "semantically consistent",
            ConsistencyStatus::Error => "error / unsupported",
        }
    }
}

/// AI comparison of a segment against retrieved fragments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ConsistencyStatus,
    #[serde(default)]
    pub diff_description: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Knowledge-base fragment used as evidence for a comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub score: Option<serde_json::Value>,
    #[serde(default)]
    pub raw_score: Option<f64>,
}

impl Fragment {
    /// Source title without the path part after `|`
    pub fn source_title(&self) -> &str {
        self.source
            .as_deref()
            .and_then(|s| s.split('|').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown source")
    }

    /// Match score for display: `raw_score` as a percentage when present
    pub fn score_display(&self) -> String {
        if let Some(raw) = self.raw_score {
            return format!("{:.1}%", raw * 100.0);
        }
        match &self.score {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "n/a".to_string(),
        }
    }
}

/// One NDJSON line of the smart compare stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    #[serde(default)]
    pub index: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub segment_content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comparison_result: ComparisonResult,
    #[serde(default, deserialize_with = "null_as_default")]
    pub retrieved_fragments: Vec<Fragment>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ComparisonRecord {
    pub fn status(&self) -> ConsistencyStatus {
        self.comparison_result.status
    }
}

// =============================================================================
// Prefixed-log outcomes
// =============================================================================

/// `DATA: ` payload closing an import task or a streamed review
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    #[serde(default)]
    pub review_result: Option<String>,
    #[serde(default)]
    pub review_content: Option<String>,
    #[serde(default)]
    pub rag_context: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Failure message for a non-success outcome
    pub fn error_message(&self) -> String {
        self.msg
            .clone()
            .unwrap_or_else(|| format!("task ended with status '{}'", self.status))
    }

    /// Review outcome as a history record, for successful review streams
    pub fn to_review_record(&self) -> Option<ReviewRecord> {
        if !self.is_success() {
            return None;
        }
        let rag_index = match &self.rag_context {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Some(ReviewRecord {
            review_result: self.review_result.clone()?,
            review_time: None,
            review_content: self.review_content.clone().unwrap_or_default(),
            rag_index,
        })
    }
}

// =============================================================================
// Generation completions (SSE)
// =============================================================================

/// A question finished by the generation pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Completion {
    /// Value of the server's `completion` field
    pub status: String,
    /// The generated question, when the server attached one
    pub question: Option<GeneratedQuestion>,
}

// =============================================================================
// Errors
// =============================================================================

/// Errors that end a stream
#[derive(Debug, Error)]
pub enum StreamError {
    /// HTTP/connection error
    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    /// Reading the body failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server answered with a non-2xx status before streaming
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Invalid stream URL or request
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type for streaming operations
pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// A frame whose payload could not be decoded; logged and dropped
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed {protocol} frame: {reason} (frame: {preview})")]
pub struct FrameDecodeError {
    pub protocol: &'static str,
    pub reason: String,
    pub preview: String,
}

impl FrameDecodeError {
    pub(crate) fn new(protocol: &'static str, reason: impl ToString, frame: &str) -> Self {
        Self {
            protocol,
            reason: reason.to_string(),
            preview: preview(frame),
        }
    }
}

fn preview(frame: &str) -> String {
    const MAX_CHARS: usize = 100;
    if frame.chars().count() > MAX_CHARS {
        let head: String = frame.chars().take(MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        frame.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults_to_error_status() {
        let record: ComparisonRecord =
            serde_json::from_str(r#"{"segment_content":"a","comparison_result":{}}"#).unwrap();
        assert_eq!(record.status(), ConsistencyStatus::Error);

        let record: ComparisonRecord = serde_json::from_str(
            r#"{"comparison_result":{"status":"semantically_consistent"},"index":3}"#,
        )
        .unwrap();
        assert_eq!(record.status(), ConsistencyStatus::SemanticallyConsistent);
        assert_eq!(record.index, Some(3));
    }

    #[test]
    fn test_record_tolerates_null_fields() {
        let record: ComparisonRecord =
            serde_json::from_str(r#"{"segment_content":"a","comparison_result":null}"#).unwrap();
        assert_eq!(record.segment_content, "a");
        assert_eq!(record.status(), ConsistencyStatus::Error);

        let record: ComparisonRecord =
            serde_json::from_str(r#"{"comparison_result":{"status":null}}"#).unwrap();
        assert_eq!(record.status(), ConsistencyStatus::Error);

        let record: ComparisonRecord = serde_json::from_str(
            r#"{"segment_content":null,"comparison_result":{"status":"fully_consistent"},
                "retrieved_fragments":[{"source":"book","content":null,"raw_score":0.5}]}"#,
        )
        .unwrap();
        assert_eq!(record.segment_content, "");
        assert_eq!(record.status(), ConsistencyStatus::FullyConsistent);
        assert_eq!(record.retrieved_fragments[0].content, "");
        assert_eq!(record.retrieved_fragments[0].score_display(), "50.0%");

        let record: ComparisonRecord =
            serde_json::from_str(r#"{"segment_content":"b","retrieved_fragments":null}"#).unwrap();
        assert!(record.retrieved_fragments.is_empty());
    }

    #[test]
    fn test_fragment_display() {
        let fragment = Fragment {
            source: Some("Pharmacopoeia 2020 | vol 1 > ch 2".into()),
            raw_score: Some(0.8765),
            ..Default::default()
        };
        assert_eq!(fragment.source_title(), "Pharmacopoeia 2020");
        assert_eq!(fragment.score_display(), "87.7%");

        let fragment = Fragment {
            score: Some(serde_json::json!("91%")),
            ..Default::default()
        };
        assert_eq!(fragment.source_title(), "unknown source");
        assert_eq!(fragment.score_display(), "91%");
    }

    #[test]
    fn test_outcome_review_record() {
        let outcome: TaskOutcome = serde_json::from_str(
            r#"{"status":"success","review_result":"驳回","review_content":"bad","rag_context":"ctx"}"#,
        )
        .unwrap();
        let record = outcome.to_review_record().unwrap();
        assert_eq!(record.review_result, "驳回");
        assert_eq!(record.rag_index.as_deref(), Some("ctx"));

        let failed: TaskOutcome =
            serde_json::from_str(r#"{"status":"error","msg":"missing"}"#).unwrap();
        assert!(failed.to_review_record().is_none());
        assert_eq!(failed.error_message(), "missing");
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_value(ApplicationEvent::Log("step1".into())).unwrap();
        assert_eq!(json, serde_json::json!({"event": "log", "payload": "step1"}));
        let json = serde_json::to_value(ApplicationEvent::Done).unwrap();
        assert_eq!(json, serde_json::json!({"event": "done"}));
    }

    #[test]
    fn test_decode_error_preview_is_truncated() {
        let frame = "x".repeat(300);
        let err = FrameDecodeError::new("ndjson", "eof", &frame);
        assert_eq!(err.preview.len(), 103);
    }
}
