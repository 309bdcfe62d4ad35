use crate::artifact::{bytes_to_mb, round2, write_json_gz};
use crate::config::{KeyConfig, NODE_VISUAL_WEIGHT, SAMPLE_MODELS_PER_COMPONENT};
use crate::graph::ModelGraph;
use crate::keys::display_name;
use crate::models::{
    ComponentDocument, ComponentMetadata, ComponentStats, EdgeRecord, NodeRecord,
};
use crate::partition::Partition;
use crate::stats::BuildStats;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub fn component_file_name(component_id: u32) -> String {
    format!("component_{component_id}.json.gz")
}

pub fn component_path(output_dir: &Path, component_id: u32) -> PathBuf {
    output_dir.join(component_file_name(component_id))
}

/// Absent values, nulls and composite values (arrays, objects) all become an
/// explicit `null` so consumers can tell "unknown" from "field not exported".
pub fn normalize_attribute(value: Option<&Value>) -> Value {
    match value {
        Some(v @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => v.clone(),
        Some(Value::Null | Value::Array(_) | Value::Object(_)) | None => Value::Null,
    }
}

/// Materializes the self-contained subgraph of one component. Also returns the
/// number of attributes that were normalized to `null`.
pub fn build_document(
    graph: &ModelGraph,
    partition: &Partition,
    component_id: u32,
    attributes: &[String],
    keys: &KeyConfig,
) -> (ComponentDocument, u64) {
    let mut missing = 0u64;

    let nodes: Vec<NodeRecord> = partition
        .members(component_id)
        .iter()
        .map(|&idx| {
            let node = graph.node(idx);
            let mut selected = Map::with_capacity(attributes.len());
            for attr in attributes {
                let value = normalize_attribute(node.attributes.get(attr));
                if value.is_null() {
                    missing += 1;
                }
                selected.insert(attr.clone(), value);
            }
            NodeRecord {
                id: node.id.clone(),
                name: display_name(&node.id, keys).to_string(),
                attributes: selected,
                size: NODE_VISUAL_WEIGHT,
            }
        })
        .collect();

    let edges: Vec<EdgeRecord> = partition
        .edges(component_id)
        .iter()
        .map(|&edge_idx| {
            let edge = &graph.edges()[edge_idx];
            EdgeRecord {
                source: graph.node(edge.source).id.clone(),
                target: graph.node(edge.target).id.clone(),
                kind: edge.kind.clone(),
            }
        })
        .collect();

    let metadata = ComponentMetadata {
        component_id,
        total_nodes: nodes.len(),
        total_edges: edges.len(),
    };

    (
        ComponentDocument {
            nodes,
            edges,
            metadata,
        },
        missing,
    )
}

/// Writes one artifact per component in parallel and returns their stats in
/// component-id order. Existing artifacts with the same name are replaced.
pub fn write_components(
    graph: &ModelGraph,
    partition: &Partition,
    output_dir: &Path,
    attributes: &[String],
    keys: &KeyConfig,
    stats: &BuildStats,
) -> Result<Vec<ComponentStats>> {
    let count = partition.component_count() as u64;
    let pb = ProgressBar::new(count);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("    {spinner:.cyan} Components     [{bar:30.cyan/blue}] {pos}/{len}")?
            .progress_chars("=> "),
    );

    let component_stats = (0..partition.component_count() as u32)
        .into_par_iter()
        .map(|component_id| {
            let (document, missing) =
                build_document(graph, partition, component_id, attributes, keys);
            let path = component_path(output_dir, component_id);
            let size = write_json_gz(&path, &document)?;

            stats.inc_components();
            stats.add_nodes(document.metadata.total_nodes as u64);
            stats.add_edges(document.metadata.total_edges as u64);
            stats.add_bytes(size);
            stats.add_missing_attributes(missing);
            pb.inc(1);

            debug!(
                component_id,
                nodes = document.metadata.total_nodes,
                bytes = size,
                "Component written"
            );

            Ok::<_, anyhow::Error>(ComponentStats {
                component_id,
                nodes: document.metadata.total_nodes,
                edges: document.metadata.total_edges,
                file_size_bytes: size,
                file_size_mb: round2(bytes_to_mb(size)),
                sample_models: document
                    .nodes
                    .iter()
                    .take(SAMPLE_MODELS_PER_COMPONENT)
                    .map(|n| n.id.clone())
                    .collect(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    pb.finish_and_clear();

    info!(
        components = stats.components(),
        bytes = stats.bytes(),
        missing_attributes = stats.missing(),
        "Component artifacts written"
    );

    Ok(component_stats)
}
