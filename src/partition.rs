use crate::graph::ModelGraph;
use petgraph::unionfind::UnionFind;
use tracing::info;

/// Connected components of a [`ModelGraph`] under undirected connectivity.
///
/// Component ids are assigned in order of each component's first node in input
/// order. They are stable for a given input file and nothing more; a rebuild
/// from a reordered graph may label the same community differently.
#[derive(Debug)]
pub struct Partition {
    assignment: Vec<u32>,
    members: Vec<Vec<usize>>,
    edges: Vec<Vec<usize>>,
}

impl Partition {
    pub fn component_count(&self) -> usize {
        self.members.len()
    }

    /// Component id of the node at `idx`.
    pub fn component_of(&self, idx: usize) -> u32 {
        self.assignment[idx]
    }

    /// Node indices of a component, in input order.
    pub fn members(&self, component_id: u32) -> &[usize] {
        &self.members[component_id as usize]
    }

    /// Indices into [`ModelGraph::edges`] whose endpoints lie in the component.
    pub fn edges(&self, component_id: u32) -> &[usize] {
        &self.edges[component_id as usize]
    }

    pub fn component_ids(&self) -> impl Iterator<Item = u32> {
        0..self.members.len() as u32
    }
}

pub fn connected_components(graph: &ModelGraph) -> Partition {
    let node_count = graph.node_count();
    let mut sets = UnionFind::<usize>::new(node_count);

    for edge in graph.edges() {
        sets.union(edge.source, edge.target);
    }

    let roots = sets.into_labeling();
    let mut root_to_component = vec![u32::MAX; node_count];
    let mut assignment = Vec::with_capacity(node_count);
    let mut members: Vec<Vec<usize>> = Vec::new();

    for (idx, &root) in roots.iter().enumerate() {
        if root_to_component[root] == u32::MAX {
            root_to_component[root] = members.len() as u32;
            members.push(Vec::new());
        }
        let component_id = root_to_component[root];
        assignment.push(component_id);
        members[component_id as usize].push(idx);
    }

    let mut edges = vec![Vec::new(); members.len()];
    for (edge_idx, edge) in graph.edges().iter().enumerate() {
        edges[assignment[edge.source] as usize].push(edge_idx);
    }

    info!(
        components = members.len(),
        nodes = node_count,
        "Connected components computed"
    );

    Partition {
        assignment,
        members,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EdgeEntry, GraphDocument, NodeEntry};
    use serde_json::Map;

    fn make_graph(nodes: &[&str], edges: &[(&str, &str)]) -> ModelGraph {
        ModelGraph::from_document(GraphDocument {
            nodes: nodes
                .iter()
                .map(|id| NodeEntry {
                    id: id.to_string(),
                    attributes: Map::new(),
                })
                .collect(),
            edges: edges
                .iter()
                .map(|(s, t)| EdgeEntry {
                    source: s.to_string(),
                    target: t.to_string(),
                    edge_type: None,
                    edge_types: Vec::new(),
                })
                .collect(),
            metadata: None,
        })
        .unwrap()
    }

    #[test]
    fn empty_graph_has_no_components() {
        let partition = connected_components(&make_graph(&[], &[]));
        assert_eq!(partition.component_count(), 0);
        assert_eq!(partition.component_ids().count(), 0);
    }

    #[test]
    fn isolated_nodes_are_singleton_components() {
        let partition = connected_components(&make_graph(&["a", "b", "c"], &[]));
        assert_eq!(partition.component_count(), 3);
        for id in partition.component_ids() {
            assert_eq!(partition.members(id).len(), 1);
            assert!(partition.edges(id).is_empty());
        }
    }

    #[test]
    fn direction_is_ignored_for_connectivity() {
        // x <- y -> z : all three connected even though no path x -> z exists
        let graph = make_graph(&["x", "y", "z"], &[("y", "x"), ("y", "z")]);
        let partition = connected_components(&graph);
        assert_eq!(partition.component_count(), 1);
        assert_eq!(partition.members(0), &[0, 1, 2]);
        assert_eq!(partition.edges(0), &[0, 1]);
    }

    #[test]
    fn ids_follow_first_member_order() {
        let graph = make_graph(
            &["s", "a/m1", "b/m1", "a/m2"],
            &[("a/m2", "a/m1")],
        );
        let partition = connected_components(&graph);
        assert_eq!(partition.component_count(), 3);
        assert_eq!(partition.component_of(0), 0);
        assert_eq!(partition.component_of(1), 1);
        assert_eq!(partition.component_of(3), 1);
        assert_eq!(partition.component_of(2), 2);
        assert_eq!(partition.members(1), &[1, 3]);
    }

    #[test]
    fn components_partition_node_set() {
        let graph = make_graph(
            &["a", "b", "c", "d", "e", "f"],
            &[("a", "c"), ("c", "e"), ("b", "d"), ("f", "f")],
        );
        let partition = connected_components(&graph);

        let mut seen = vec![0u32; graph.node_count()];
        for id in partition.component_ids() {
            for &member in partition.members(id) {
                seen[member] += 1;
                assert_eq!(partition.component_of(member), id);
            }
        }
        assert!(seen.iter().all(|&count| count == 1));

        let edge_total: usize = partition
            .component_ids()
            .map(|id| partition.edges(id).len())
            .sum();
        assert_eq!(edge_total, graph.edge_count());
    }

    #[test]
    fn same_graph_gives_same_partition() {
        let nodes = ["p", "q", "r", "s"];
        let edges = [("q", "s"), ("p", "r")];
        let first = connected_components(&make_graph(&nodes, &edges));
        let second = connected_components(&make_graph(&nodes, &edges));
        for idx in 0..nodes.len() {
            assert_eq!(first.component_of(idx), second.component_of(idx));
        }
    }
}
