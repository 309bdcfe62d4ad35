//! Small connected sample of a large graph, for front-end fixtures.
//!
//! The sample is a breadth-first walk from one start node across edges in
//! both directions. Only edges whose two endpoints were both selected are
//! kept, so the result is itself a valid build input.

use crate::artifact::write_json_gz;
use crate::graph::ModelGraph;
use crate::models::{EdgeEntry, GraphDocument, NodeEntry, SampleMetadata};
use anyhow::{bail, Context, Result};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct SampleOptions {
    /// Start identifier. Defaults to the first node in input order with an edge.
    pub start: Option<String>,
    pub max_nodes: Option<usize>,
}

pub fn sample_graph(graph: &ModelGraph, options: &SampleOptions) -> Result<GraphDocument> {
    if options.max_nodes == Some(0) {
        bail!("max_nodes must be at least 1");
    }

    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); graph.node_count()];
    for (edge_idx, edge) in graph.edges().iter().enumerate() {
        incident[edge.source].push(edge_idx);
        if edge.target != edge.source {
            incident[edge.target].push(edge_idx);
        }
    }

    let start = match &options.start {
        Some(id) => graph
            .position(id)
            .with_context(|| format!("Start node not found in graph: {id:?}"))?,
        None => match incident.iter().position(|edges| !edges.is_empty()) {
            Some(idx) => idx,
            None => bail!("Graph has no edges to sample from"),
        },
    };
    info!("Starting sample from node: {}", graph.node(start).id);

    let limit = options.max_nodes.unwrap_or(usize::MAX);
    let mut selected = vec![false; graph.node_count()];
    let mut queued = vec![false; graph.node_count()];
    let mut queue = VecDeque::from([start]);
    queued[start] = true;
    let mut taken = 0usize;

    while let Some(current) = queue.pop_front() {
        if taken >= limit {
            break;
        }
        selected[current] = true;
        taken += 1;

        for &edge_idx in &incident[current] {
            let edge = &graph.edges()[edge_idx];
            let other = if edge.source == current {
                edge.target
            } else {
                edge.source
            };
            if !queued[other] {
                queued[other] = true;
                queue.push_back(other);
            }
        }
    }

    let nodes: Vec<NodeEntry> = graph
        .nodes()
        .iter()
        .zip(&selected)
        .filter(|(_, keep)| **keep)
        .map(|(node, _)| NodeEntry {
            id: node.id.clone(),
            attributes: node.attributes.clone(),
        })
        .collect();

    let edges: Vec<EdgeEntry> = graph
        .edges()
        .iter()
        .filter(|e| selected[e.source] && selected[e.target])
        .map(|e| EdgeEntry {
            source: graph.node(e.source).id.clone(),
            target: graph.node(e.target).id.clone(),
            edge_type: Some(e.kind.as_str().to_string()),
            edge_types: Vec::new(),
        })
        .collect();

    let metadata = SampleMetadata {
        total_nodes: nodes.len(),
        total_edges: edges.len(),
        sample: true,
        original_size: graph.node_count(),
    };
    Ok(GraphDocument {
        nodes,
        edges,
        metadata: Some(metadata),
    })
}

/// Writes the sample next to its final path and renames it in. A `.gz`
/// extension selects gzip output; anything else is pretty-printed JSON.
pub fn write_sample(path: &Path, document: &GraphDocument) -> Result<u64> {
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        return write_json_gz(path, document);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let file = File::create(tmp_path)
        .with_context(|| format!("Failed to create temp sample: {:?}", tmp_path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document)
        .with_context(|| format!("Failed to serialize sample: {:?}", path))?;
    writer.flush()?;
    drop(writer);

    fs::rename(tmp_path, path)
        .with_context(|| format!("Failed to rename temp sample to: {:?}", path))?;
    Ok(fs::metadata(path)?.len())
}

/// Loads `input`, samples it and writes the result to `output`.
pub fn run_sample(input: &Path, output: &Path, options: &SampleOptions) -> Result<SampleMetadata> {
    let graph = ModelGraph::load(input)
        .with_context(|| format!("Failed to load graph: {}", input.display()))?;
    let document = sample_graph(&graph, options)?;
    let bytes = write_sample(output, &document)?;

    let metadata = document
        .metadata
        .context("Sample document is missing its metadata")?;
    info!(
        nodes = metadata.total_nodes,
        edges = metadata.total_edges,
        original = metadata.original_size,
        bytes,
        "Sample written to {}",
        output.display()
    );
    Ok(metadata)
}
