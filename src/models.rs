use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Relationship between a derived model and its base model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Finetune,
    Quantized,
    Adapter,
    Merge,
    Unknown,
    Other(String),
}

impl EdgeKind {
    pub fn as_str(&self) -> &str {
        match self {
            EdgeKind::Finetune => "finetune",
            EdgeKind::Quantized => "quantized",
            EdgeKind::Adapter => "adapter",
            EdgeKind::Merge => "merge",
            EdgeKind::Unknown => "unknown",
            EdgeKind::Other(kind) => kind,
        }
    }

    /// First-in-collection wins: `edge_type` if recorded, else the head of `edge_types`.
    pub fn resolve(edge_type: Option<&str>, edge_types: &[String]) -> Self {
        edge_type
            .or_else(|| edge_types.first().map(String::as_str))
            .map(EdgeKind::from)
            .unwrap_or(EdgeKind::Unknown)
    }
}

impl From<&str> for EdgeKind {
    fn from(kind: &str) -> Self {
        match kind {
            "finetune" => EdgeKind::Finetune,
            "quantized" => EdgeKind::Quantized,
            "adapter" => EdgeKind::Adapter,
            "merge" => EdgeKind::Merge,
            "unknown" => EdgeKind::Unknown,
            other => EdgeKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EdgeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EdgeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kind = String::deserialize(deserializer)?;
        Ok(EdgeKind::from(kind.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Source graph document (node-link JSON)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<NodeEntry>,
    #[serde(default, alias = "links")]
    pub edges: Vec<EdgeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SampleMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    pub id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeEntry {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edge_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub sample: bool,
    pub original_size: usize,
}

// ---------------------------------------------------------------------------
// Component artifact
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
    pub size: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub component_id: u32,
    pub total_nodes: usize,
    pub total_edges: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentDocument {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    pub metadata: ComponentMetadata,
}

/// Per-component summary carried into the primary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStats {
    pub component_id: u32,
    pub nodes: usize,
    pub edges: usize,
    pub file_size_bytes: u64,
    pub file_size_mb: f64,
    pub sample_models: Vec<String>,
}
