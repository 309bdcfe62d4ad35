use crate::artifact::{read_json_gz, write_json_gz};
use crate::graph::ModelGraph;
use crate::models::ComponentStats;
use crate::partition::Partition;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PRIMARY_INDEX_FILE: &str = "component_index.json.gz";

/// Canonical identifier → component-id mapping. Every derived index is a
/// re-encoding of `component_index` and must agree with it for every key.
#[derive(Debug, Serialize, Deserialize)]
pub struct PrimaryIndex {
    pub component_index: BTreeMap<String, u32>,
    pub component_stats: Vec<ComponentStats>,
    pub total_components: usize,
    pub total_nodes: usize,
    pub total_edges: usize,
}

impl PrimaryIndex {
    pub fn build(
        graph: &ModelGraph,
        partition: &Partition,
        component_stats: Vec<ComponentStats>,
    ) -> Result<Self> {
        let component_index: BTreeMap<String, u32> = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.id.clone(), partition.component_of(idx)))
            .collect();

        let index = Self {
            component_index,
            component_stats,
            total_components: partition.component_count(),
            total_nodes: graph.node_count(),
            total_edges: graph.edge_count(),
        };
        index.check_totals()?;

        info!(
            models = index.len(),
            components = index.total_components,
            "Primary index built"
        );
        Ok(index)
    }

    /// Per-component counts must add up to the graph totals.
    fn check_totals(&self) -> Result<()> {
        if self.component_index.len() != self.total_nodes {
            bail!(
                "Primary index has {} keys but the graph has {} nodes",
                self.component_index.len(),
                self.total_nodes
            );
        }
        if self.component_stats.len() != self.total_components {
            bail!(
                "Found stats for {} components, expected {}",
                self.component_stats.len(),
                self.total_components
            );
        }
        let nodes: usize = self.component_stats.iter().map(|s| s.nodes).sum();
        if nodes != self.total_nodes {
            bail!(
                "Component node counts sum to {nodes}, expected {}",
                self.total_nodes
            );
        }
        let edges: usize = self.component_stats.iter().map(|s| s.edges).sum();
        if edges != self.total_edges {
            bail!(
                "Component edge counts sum to {edges}, expected {}",
                self.total_edges
            );
        }
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> Option<u32> {
        self.component_index.get(id).copied()
    }

    /// Entries in identifier order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u32)> {
        self.component_index
            .iter()
            .map(|(id, component_id)| (id.as_str(), *component_id))
    }

    pub fn len(&self) -> usize {
        self.component_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.component_index.is_empty()
    }

    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(PRIMARY_INDEX_FILE)
    }

    pub fn write(&self, output_dir: &Path) -> Result<u64> {
        let path = Self::path(output_dir);
        let size = write_json_gz(&path, self)?;
        info!(path = ?path, bytes = size, "Primary index saved");
        Ok(size)
    }

    pub fn load(output_dir: &Path) -> Result<Self> {
        read_json_gz(&Self::path(output_dir))
    }
}
