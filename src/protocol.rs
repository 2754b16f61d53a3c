use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of the upstream recursive tree listing.
#[derive(Debug, Deserialize)]
pub struct TreeResponse {
    #[serde(default)]
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

/// One file or directory record of the upstream listing.
///
/// Fields other than `path` and `type` are carried through untouched so the
/// JSON API hands the frontend the same records the upstream returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: EntryPath,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TreeEntry {
    #[cfg(test)]
    pub fn new(path: &str, kind: EntryKind) -> Self {
        Self {
            path: EntryPath::from(path),
            kind,
            extra: Map::new(),
        }
    }

    #[cfg(test)]
    pub fn blob(path: &str) -> Self {
        Self::new(path, EntryKind::Blob)
    }

    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }
}

/// A slash-delimited repository path kept as its ordered segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EntryPath {
    segments: Vec<String>,
}

impl EntryPath {
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl From<&str> for EntryPath {
    fn from(path: &str) -> Self {
        Self {
            segments: path.split('/').map(str::to_owned).collect(),
        }
    }
}

impl From<String> for EntryPath {
    fn from(path: String) -> Self {
        Self::from(path.as_str())
    }
}

impl From<EntryPath> for String {
    fn from(path: EntryPath) -> Self {
        path.segments.join("/")
    }
}

/// Upstream object type. Only blobs count as files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryKind {
    Blob,
    Other(String),
}

impl From<String> for EntryKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "blob" => EntryKind::Blob,
            _ => EntryKind::Other(kind),
        }
    }
}

impl From<EntryKind> for String {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Blob => "blob".to_string(),
            EntryKind::Other(other) => other,
        }
    }
}

/// Success body of `/api/models`.
#[derive(Debug, Serialize)]
pub struct ModelsResponse<'a> {
    pub tree: &'a [TreeEntry],
    pub cached: bool,
}

/// Failure body of `/api/models`, mirroring the upstream status.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub status: u16,
    pub detail: Value,
}
