//! Knowledge base, fragment audit and search types

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::null_as_default;

/// Collection selected when none is given
pub const DEFAULT_COLLECTION: &str = "Pharmacopoeia_Official";

/// Title of a fragment without any heading level
pub const UNCATEGORIZED: &str = "未分类";

/// Metadata key of the source file name
pub const SOURCE_FILE_KEY: &str = "来源文件";
/// Metadata key of the combined heading title
pub const COMBO_TITLE_KEY: &str = "组合标题";
/// Metadata key of the fragment text without the heading path
pub const PLAIN_CONTENT_KEY: &str = "片段内容";
/// Metadata key of the full heading path
pub const FULL_PATH_KEY: &str = "完整路径";

/// Heading levels of a fragment, outermost first
pub const LEVEL_KEYS: [&str; 8] = ["L1", "L2", "L3", "L4", "L5", "L6", "L7", "L8"];

/// Number of innermost levels that make up a combined title
const COMBO_DEPTH: usize = 3;

/// Combined title of a heading path: the innermost three levels, innermost
/// first, joined by ` / `. Blank levels are skipped.
pub fn combo_title<S: AsRef<str>>(levels: &[S]) -> String {
    let levels: Vec<&str> = levels
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .collect();
    if levels.is_empty() {
        return UNCATEGORIZED.to_string();
    }
    let start = levels.len().saturating_sub(COMBO_DEPTH);
    let mut tail = levels[start..].to_vec();
    tail.reverse();
    tail.join(" / ")
}

/// Non-blank `L1`..`L8` values of a metadata map, outermost first
fn levels_of(map: &Map<String, Value>) -> Vec<String> {
    LEVEL_KEYS
        .iter()
        .filter_map(|key| text_of(map, key))
        .map(str::to_string)
        .collect()
}

fn text_of<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `L1`..`L8` as sent to the server; missing levels are empty strings
fn level_fields<S: AsRef<str>>(levels: &[S]) -> BTreeMap<String, String> {
    LEVEL_KEYS
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let value = levels.get(i).map(|l| l.as_ref().trim()).unwrap_or_default();
            (key.to_string(), value.to_string())
        })
        .collect()
}

/// Accept an id sent as a string or a number
fn id_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

/// Accept a flag sent as a bool, a 0/1 number or a string
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    })
}

// =============================================================================
// Knowledge base
// =============================================================================

/// Entry count of one source file in a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCount {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub count: u64,
}

/// A vector collection with its size and sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionOverview {
    pub collection_name: String,
    /// `-1` when the server could not count the collection
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_count: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<SourceCount>,
}

impl CollectionOverview {
    pub fn is_readable(&self) -> bool {
        self.total_count >= 0
    }
}

/// One stored knowledge-base document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDoc {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
}

impl KnowledgeDoc {
    pub fn levels(&self) -> Vec<String> {
        levels_of(&self.metadata)
    }

    /// `L1 / L2`, or [`UNCATEGORIZED`] without levels
    pub fn heading(&self) -> String {
        let top: Vec<&str> = ["L1", "L2"]
            .iter()
            .filter_map(|key| text_of(&self.metadata, key))
            .collect();
        if top.is_empty() {
            UNCATEGORIZED.to_string()
        } else {
            top.join(" / ")
        }
    }

    /// Stored combined title, computed from the levels when missing
    pub fn combo_title(&self) -> String {
        match text_of(&self.metadata, COMBO_TITLE_KEY) {
            Some(title) => title.to_string(),
            None => {
                let levels = self.levels();
                if levels.is_empty() {
                    "-".to_string()
                } else {
                    combo_title(&levels)
                }
            }
        }
    }

    pub fn source_file(&self) -> Option<&str> {
        text_of(&self.metadata, SOURCE_FILE_KEY)
    }

    /// Fragment text without the heading path the server prepends for embedding
    pub fn plain_content(&self) -> &str {
        text_of(&self.metadata, PLAIN_CONTENT_KEY).unwrap_or(&self.content)
    }
}

/// Filtered page query over a collection
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeQuery {
    pub collection_name: String,
    pub page: u32,
    pub page_size: u32,
    /// Metadata key to substring filter
    pub filters: BTreeMap<String, String>,
}

impl Default for KnowledgeQuery {
    fn default() -> Self {
        Self {
            collection_name: DEFAULT_COLLECTION.to_string(),
            page: 1,
            page_size: 20,
            filters: BTreeMap::new(),
        }
    }
}

/// One page of knowledge-base documents
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgePage {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<KnowledgeDoc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub page: u32,
}

/// Create-or-update payload for a knowledge-base document.
///
/// The server builds the embedded text from `content` and the levels.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeDraft {
    pub collection_name: String,
    pub doc_id: Option<String>,
    pub content: String,
    pub metadata_raw: BTreeMap<String, String>,
}

impl KnowledgeDraft {
    /// Draft with the source file and heading path as metadata
    pub fn new<S: AsRef<str>>(
        collection_name: impl Into<String>,
        content: impl Into<String>,
        source_file: impl Into<String>,
        levels: &[S],
    ) -> Self {
        let mut metadata_raw = BTreeMap::new();
        metadata_raw.insert(SOURCE_FILE_KEY.to_string(), source_file.into());
        for (key, level) in LEVEL_KEYS.iter().zip(levels) {
            let level = level.as_ref().trim();
            if !level.is_empty() {
                metadata_raw.insert(key.to_string(), level.to_string());
            }
        }
        metadata_raw.insert(COMBO_TITLE_KEY.to_string(), combo_title(levels));

        Self {
            collection_name: collection_name.into(),
            doc_id: None,
            content: content.into(),
            metadata_raw,
        }
    }

    pub fn combo_title(&self) -> &str {
        self.metadata_raw
            .get(COMBO_TITLE_KEY)
            .map(String::as_str)
            .unwrap_or(UNCATEGORIZED)
    }
}

// =============================================================================
// Fragment audit
// =============================================================================

/// A structured fragment awaiting review before embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditFragment {
    pub fragment_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub book_id: i64,
    #[serde(default)]
    pub book_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "flag")]
    pub is_embedded: bool,
    #[serde(default)]
    pub combo_title: Option<String>,
    #[serde(default)]
    pub source_segment_range: Option<String>,
    /// `L1`..`L8` and any further columns
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuditFragment {
    pub fn levels(&self) -> Vec<String> {
        levels_of(&self.extra)
    }

    /// Stored combined title, or [`UNCATEGORIZED`]
    pub fn title(&self) -> &str {
        self.combo_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNCATEGORIZED)
    }
}

/// One segment range worth of fragments
#[derive(Debug, Clone, Deserialize)]
pub struct FragmentBatch {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<AuditFragment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_batches: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_batch_idx: u32,
    #[serde(default)]
    pub current_range: Option<String>,
}

/// Create-or-update payload for a fragment
#[derive(Debug, Clone, Serialize)]
pub struct FragmentDraft {
    pub fragment_id: Option<i64>,
    pub book_id: i64,
    pub book_name: String,
    pub source_segment_range: String,
    pub content: String,
    pub combo_title: String,
    #[serde(flatten)]
    pub levels: BTreeMap<String, String>,
}

impl FragmentDraft {
    pub fn new<S: AsRef<str>>(book_id: i64, content: impl Into<String>, levels: &[S]) -> Self {
        Self {
            fragment_id: None,
            book_id,
            book_name: String::new(),
            source_segment_range: String::new(),
            content: content.into(),
            combo_title: combo_title(levels),
            levels: level_fields(levels),
        }
    }
}

// =============================================================================
// Search tool
// =============================================================================

/// One hit of a knowledge-base search.
///
/// The plain search sends `source`, `path` and `score`; the level lookup
/// sends `metadata` and `score_percent` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default, deserialize_with = "id_text")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub score: Option<Value>,
    #[serde(default)]
    pub raw_score: Option<f64>,
    #[serde(default)]
    pub score_percent: Option<String>,
    #[serde(default)]
    pub source_collection: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
}

impl SearchHit {
    pub fn display_score(&self) -> String {
        if let Some(percent) = self.score_percent.as_deref().filter(|p| !p.is_empty()) {
            return percent.to_string();
        }
        match &self.score {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "N/A".to_string(),
        }
    }

    pub fn display_source(&self) -> String {
        if let Some(source) = self.source.as_deref().filter(|s| !s.is_empty()) {
            return source.to_string();
        }
        let file = text_of(&self.metadata, SOURCE_FILE_KEY).unwrap_or("Base");
        let title = text_of(&self.metadata, COMBO_TITLE_KEY).unwrap_or("无标题");
        format!("{} | {}", file, title)
    }

    pub fn display_path(&self) -> String {
        self.path
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| text_of(&self.metadata, FULL_PATH_KEY))
            .unwrap_or("路径未知")
            .to_string()
    }
}

/// Reply of both search endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<SearchHit>,
    /// Only sent by the level lookup
    #[serde(default)]
    pub total_candidates_scanned: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_combo_title_innermost_first() {
        assert_eq!(combo_title(&["药典", "", "第一章", "第二节", "三"]), "三 / 第二节 / 第一章");
        assert_eq!(combo_title(&["  ", ""]), UNCATEGORIZED);
        assert_eq!(combo_title::<&str>(&[]), UNCATEGORIZED);
        assert_eq!(combo_title(&["只有一级"]), "只有一级");
    }

    #[test]
    fn test_knowledge_draft_metadata() {
        let draft = KnowledgeDraft::new(DEFAULT_COLLECTION, "每片0.5g", "药典.docx", &["二部", "", "片剂"]);
        assert_eq!(draft.metadata_raw.get("L1").map(String::as_str), Some("二部"));
        assert!(!draft.metadata_raw.contains_key("L2"));
        assert_eq!(draft.metadata_raw.get("L3").map(String::as_str), Some("片剂"));
        assert_eq!(draft.combo_title(), "片剂 / 二部");

        let body = serde_json::to_value(&draft).unwrap();
        assert_eq!(body["doc_id"], Value::Null);
        assert_eq!(body["metadata_raw"][SOURCE_FILE_KEY], "药典.docx");
    }

    #[test]
    fn test_knowledge_doc_display() {
        let doc: KnowledgeDoc = serde_json::from_value(json!({
            "id": 17,
            "content": "二部 > 片剂\n每片0.5g",
            "metadata": {"L1": "二部", "L3": "片剂", "片段内容": "每片0.5g"}
        }))
        .unwrap();
        assert_eq!(doc.id, "17");
        assert_eq!(doc.heading(), "二部");
        assert_eq!(doc.combo_title(), "片剂 / 二部");
        assert_eq!(doc.plain_content(), "每片0.5g");
        assert_eq!(doc.source_file(), None);

        let bare: KnowledgeDoc =
            serde_json::from_value(json!({"id": "a", "content": null, "metadata": null})).unwrap();
        assert_eq!(bare.heading(), UNCATEGORIZED);
        assert_eq!(bare.combo_title(), "-");
        assert_eq!(bare.plain_content(), "");
    }

    #[test]
    fn test_fragment_flags_and_levels() {
        let fragment: AuditFragment = serde_json::from_value(json!({
            "fragment_id": 5, "book_id": 2, "content": "text", "is_embedded": 1,
            "L1": "总则", "L2": null, "L3": "  ", "combo_title": ""
        }))
        .unwrap();
        assert!(fragment.is_embedded);
        assert_eq!(fragment.levels(), vec!["总则".to_string()]);
        assert_eq!(fragment.title(), UNCATEGORIZED);

        let fragment: AuditFragment =
            serde_json::from_value(json!({"fragment_id": 6, "is_embedded": 0})).unwrap();
        assert!(!fragment.is_embedded);
    }

    #[test]
    fn test_fragment_draft_sends_every_level() {
        let draft = FragmentDraft::new(2, "text", &["总则", "用法"]);
        let body = serde_json::to_value(&draft).unwrap();
        assert_eq!(body["L1"], "总则");
        assert_eq!(body["L2"], "用法");
        assert_eq!(body["L8"], "");
        assert_eq!(body["combo_title"], "用法 / 总则");
        assert_eq!(body["fragment_id"], Value::Null);
    }

    #[test]
    fn test_search_hit_display_fallbacks() {
        let plain: SearchHit = serde_json::from_value(json!({
            "id": "x1", "source": "药典 | 二部", "path": "二部 > 片剂", "content": "c", "score": "91%"
        }))
        .unwrap();
        assert_eq!(plain.display_score(), "91%");
        assert_eq!(plain.display_source(), "药典 | 二部");
        assert_eq!(plain.display_path(), "二部 > 片剂");

        let lookup: SearchHit = serde_json::from_value(json!({
            "id": "x2", "content": "c", "score": 0.42, "score_percent": "42.0%",
            "metadata": {"组合标题": "片剂", "完整路径": "二部 > 片剂"}
        }))
        .unwrap();
        assert_eq!(lookup.display_score(), "42.0%");
        assert_eq!(lookup.display_source(), "Base | 片剂");
        assert_eq!(lookup.display_path(), "二部 > 片剂");

        let empty: SearchHit = serde_json::from_value(json!({"id": "x3"})).unwrap();
        assert_eq!(empty.display_score(), "N/A");
        assert_eq!(empty.display_path(), "路径未知");
    }
}
