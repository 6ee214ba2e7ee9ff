//! Core data types for the retrieval system.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

/// A scalar metadata value. Chunk and store metadata is a `map<string, scalar>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_string())
    }
}
impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Str(v)
    }
}
impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}
impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}
impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

pub type Metadata = HashMap<String, MetaValue>;

/// A retrieval unit produced by parsing and splitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub source: PathBuf,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(content: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// An error chunk recording a parser failure. Parsers must always
    /// return at least one chunk, so failures are encoded rather than
    /// propagated.
    pub fn error(source: impl Into<PathBuf>, detail: impl std::fmt::Display) -> Self {
        Self::new(String::new(), source).with_meta("type", "error").with_meta(
            "error_detail",
            detail.to_string(),
        )
    }
}

/// First 8 hex characters of the file's SHA256 content hash.
pub fn short_file_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    format!("{digest:x}")[..8].to_string()
}

/// Full 64-character hex SHA256, used as the manifest's `hash` field.
pub fn full_file_hash(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Deterministic chunk id: `<abs_path>_<first8_of_file_hash>_chunk_<index>`.
///
/// This is a stable contract between the manifest and the vector store;
/// changing the grammar requires a rebuild (§6).
pub fn chunk_id(abs_path: &Path, file_hash8: &str, index: usize) -> String {
    format!("{}_{}_chunk_{}", abs_path.display(), file_hash8, index)
}

/// Status of a manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum EntryStatus {
    Indexed,
    Error(String),
}

impl EntryStatus {
    pub fn is_indexed(&self) -> bool {
        matches!(self, EntryStatus::Indexed)
    }

    pub fn error(detail: impl std::fmt::Display) -> Self {
        EntryStatus::Error(detail.to_string())
    }
}

/// Per-indexed-file durable record: hash, timestamp, and owned chunk ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub timestamp: f64,
    pub hash: String,
    pub chunk_ids: Vec<String>,
    pub status: EntryStatus,
}

/// A record stored in the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// A ranked query match: id, text, metadata, and cosine distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMatch {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// A filesystem change event. `Stop` shuts down the consuming worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { src: PathBuf, dest: PathBuf },
    Stop,
}

impl WatchEvent {
    /// The primary path this event concerns, used for FIFO queue ordering
    /// and logging. `Moved` reports its destination and `Stop` has none.
    pub fn path(&self) -> Option<&Path> {
        match self {
            WatchEvent::Created(p) | WatchEvent::Modified(p) | WatchEvent::Deleted(p) => {
                Some(p.as_path())
            }
            WatchEvent::Moved { dest, .. } => Some(dest.as_path()),
            WatchEvent::Stop => None,
        }
    }
}

/// A retrieval query: non-empty text plus an optional metadata predicate.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub text: String,
    pub filter: Option<MetadataFilter>,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filter: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A metadata predicate: exact-match equality on one or more keys.
///
/// This is intentionally the narrowest predicate that satisfies
/// `delete_by_metadata` and filtered queries; richer predicates are an
/// external-interface concern, not specified here.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub equals: HashMap<String, MetaValue>,
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        let mut equals = HashMap::new();
        equals.insert(key.into(), value.into());
        Self { equals }
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| metadata.get(k).map(|mv| mv == v).unwrap_or(false))
    }
}

/// Ordered list of chunk texts, highest relevance first.
pub type RetrievalResult = Vec<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_matches_grammar() {
        let id = chunk_id(Path::new("/data/a.pdf"), "deadbeef", 3);
        assert_eq!(id, "/data/a.pdf_deadbeef_chunk_3");
    }

    #[test]
    fn short_hash_is_first_8_hex_of_full_hash() {
        let content = b"hello world";
        let short = short_file_hash(content);
        let full = full_file_hash(content);
        assert_eq!(short, &full[..8]);
        assert_eq!(short.len(), 8);
    }

    #[test]
    fn error_chunk_has_error_type_metadata() {
        let chunk = Chunk::error("/data/bad.pdf", "truncated stream");
        assert_eq!(
            chunk.metadata.get("type"),
            Some(&MetaValue::Str("error".to_string()))
        );
        assert!(chunk.content.is_empty());
    }

    #[test]
    fn metadata_filter_matches_exact_equality() {
        let mut metadata = Metadata::new();
        metadata.insert("page".to_string(), MetaValue::Int(2));
        let filter = MetadataFilter::eq("page", 2i64);
        assert!(filter.matches(&metadata));

        let filter = MetadataFilter::eq("page", 3i64);
        assert!(!filter.matches(&metadata));
    }

    #[test]
    fn watch_event_path_reports_moved_destination() {
        let event = WatchEvent::Moved {
            src: PathBuf::from("/a"),
            dest: PathBuf::from("/b"),
        };
        assert_eq!(event.path(), Some(Path::new("/b")));
        assert_eq!(WatchEvent::Stop.path(), None);
    }

    #[test]
    fn retrieval_query_empty_detection() {
        assert!(RetrievalQuery::new("   ").is_empty());
        assert!(!RetrievalQuery::new("alpha").is_empty());
    }
}
