use crate::models::{EdgeKind, GraphDocument, NodeEntry};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Malformed or missing source graph. Always fatal to a rebuild.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to open graph file {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse graph document")]
    Parse(#[from] serde_json::Error),
    #[error("node at position {position} has an empty identifier")]
    EmptyIdentifier { position: usize },
    #[error("duplicate node identifier {0:?}")]
    DuplicateNode(String),
    #[error("edge {source_id:?} -> {target_id:?} references unknown node {missing:?}")]
    DanglingEdge {
        source_id: String,
        target_id: String,
        missing: String,
    },
}

#[derive(Debug, Clone)]
pub struct ModelNode {
    pub id: String,
    pub attributes: Map<String, Value>,
}

/// Undirected edge between two node indices, oriented as first recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub source: usize,
    pub target: usize,
    pub kind: EdgeKind,
}

/// In-memory model graph. Node indices follow input order.
pub struct ModelGraph {
    nodes: Vec<ModelNode>,
    index: FxHashMap<String, usize>,
    edges: Vec<GraphEdge>,
}

impl ModelGraph {
    /// Loads a node-link JSON graph, decompressing `.bz2` and `.gz` inputs.
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let file = File::open(path).map_err(|source| GraphError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loading graph from: {}", path.display());

        let reader: Box<dyn Read> = match path.extension().and_then(|e| e.to_str()) {
            Some("bz2") => Box::new(BzDecoder::new(file)),
            Some("gz") => Box::new(GzDecoder::new(file)),
            _ => Box::new(file),
        };
        let document: GraphDocument =
            serde_json::from_reader(BufReader::with_capacity(256 * 1024, reader))?;

        let graph = Self::from_document(document)?;
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Graph loaded"
        );
        Ok(graph)
    }

    pub fn from_document(document: GraphDocument) -> Result<Self, GraphError> {
        let mut nodes = Vec::with_capacity(document.nodes.len());
        let mut index =
            FxHashMap::with_capacity_and_hasher(document.nodes.len(), Default::default());

        for (position, NodeEntry { id, attributes }) in document.nodes.into_iter().enumerate() {
            if id.is_empty() {
                return Err(GraphError::EmptyIdentifier { position });
            }
            if index.contains_key(&id) {
                return Err(GraphError::DuplicateNode(id));
            }
            index.insert(id.clone(), nodes.len());
            nodes.push(ModelNode { id, attributes });
        }

        let mut seen = FxHashSet::default();
        let mut edges = Vec::with_capacity(document.edges.len());
        let mut collapsed = 0u64;

        for entry in document.edges {
            let lookup = |id: &str| {
                index.get(id).copied().ok_or_else(|| GraphError::DanglingEdge {
                    source_id: entry.source.clone(),
                    target_id: entry.target.clone(),
                    missing: id.to_string(),
                })
            };
            let source = lookup(&entry.source)?;
            let target = lookup(&entry.target)?;

            if !seen.insert((source.min(target), source.max(target))) {
                collapsed += 1;
                continue;
            }
            edges.push(GraphEdge {
                source,
                target,
                kind: EdgeKind::resolve(entry.edge_type.as_deref(), &entry.edge_types),
            });
        }

        if collapsed > 0 {
            debug!(collapsed, "Collapsed repeated edges between the same node pair");
        }

        Ok(Self {
            nodes,
            index,
            edges,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> &ModelNode {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[ModelNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EdgeEntry;

    fn node(id: &str) -> NodeEntry {
        NodeEntry {
            id: id.to_string(),
            attributes: Map::new(),
        }
    }

    fn edge(source: &str, target: &str, kind: Option<&str>) -> EdgeEntry {
        EdgeEntry {
            source: source.to_string(),
            target: target.to_string(),
            edge_type: kind.map(str::to_string),
            edge_types: Vec::new(),
        }
    }

    fn document(nodes: &[&str], edges: Vec<EdgeEntry>) -> GraphDocument {
        GraphDocument {
            nodes: nodes.iter().map(|id| node(id)).collect(),
            edges,
            metadata: None,
        }
    }

    #[test]
    fn builds_index_in_input_order() {
        let graph = ModelGraph::from_document(document(&["b/x", "a/y"], vec![])).unwrap();
        assert_eq!(graph.position("b/x"), Some(0));
        assert_eq!(graph.position("a/y"), Some(1));
        assert_eq!(graph.position("c/z"), None);
    }

    #[test]
    fn rejects_duplicate_identifier() {
        let result = ModelGraph::from_document(document(&["a/x", "a/x"], vec![]));
        assert!(matches!(result, Err(GraphError::DuplicateNode(id)) if id == "a/x"));
    }

    #[test]
    fn rejects_empty_identifier() {
        let result = ModelGraph::from_document(document(&["a/x", ""], vec![]));
        assert!(matches!(
            result,
            Err(GraphError::EmptyIdentifier { position: 1 })
        ));
    }

    #[test]
    fn rejects_dangling_edge() {
        let result =
            ModelGraph::from_document(document(&["a/x"], vec![edge("a/x", "ghost", None)]));
        match result {
            Err(GraphError::DanglingEdge { missing, .. }) => assert_eq!(missing, "ghost"),
            other => panic!("expected dangling edge error, got {:?}", other.err()),
        }
    }

    #[test]
    fn collapses_reverse_duplicate_keeping_first() {
        let graph = ModelGraph::from_document(document(
            &["a/x", "a/y"],
            vec![
                edge("a/x", "a/y", Some("finetune")),
                edge("a/y", "a/x", Some("quantized")),
                edge("a/x", "a/y", Some("adapter")),
            ],
        ))
        .unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(
            graph.edges()[0],
            GraphEdge {
                source: 0,
                target: 1,
                kind: EdgeKind::Finetune
            }
        );
    }

    #[test]
    fn keeps_self_loop() {
        let graph =
            ModelGraph::from_document(document(&["a/x"], vec![edge("a/x", "a/x", None)])).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges()[0].kind, EdgeKind::Unknown);
    }

    #[test]
    fn empty_document_is_valid() {
        let graph = ModelGraph::from_document(document(&[], vec![])).unwrap();
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn load_reports_missing_file() {
        let result = ModelGraph::load(Path::new("/nonexistent/graph.json"));
        assert!(matches!(result, Err(GraphError::Open { .. })));
    }
}
