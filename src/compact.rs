use crate::artifact::{read_json_gz, write_json_gz};
use crate::index::PrimaryIndex;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const COMPACT_INDEX_FILE: &str = "compact_index.json.gz";

/// Sorted `[identifier, component_id]` pairs. Clients binary-search the array
/// instead of building a hash map from a large JSON object.
#[derive(Debug, Serialize)]
pub struct CompactIndex<'a> {
    pub index: Vec<(&'a str, u32)>,
    pub total_models: usize,
}

#[derive(Debug, Deserialize)]
pub struct CompactIndexDoc {
    pub index: Vec<(String, u32)>,
    pub total_models: usize,
}

impl<'a> CompactIndex<'a> {
    pub fn build(primary: &'a PrimaryIndex) -> Self {
        // Primary entries already iterate in byte order of the identifier.
        let index: Vec<(&str, u32)> = primary.entries().collect();
        Self {
            total_models: index.len(),
            index,
        }
    }

    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(COMPACT_INDEX_FILE)
    }

    pub fn write(&self, output_dir: &Path) -> Result<u64> {
        let size = write_json_gz(&Self::path(output_dir), self)?;
        info!(
            models = self.total_models,
            bytes = size,
            "Compact index created"
        );
        Ok(size)
    }
}

impl CompactIndexDoc {
    pub fn load(output_dir: &Path) -> Result<Self> {
        read_json_gz(&CompactIndex::path(output_dir))
    }

    /// Binary search by identifier, the way a client reads the array.
    pub fn resolve(&self, id: &str) -> Option<u32> {
        self.index
            .binary_search_by(|(key, _)| key.as_str().cmp(id))
            .ok()
            .map(|pos| self.index[pos].1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn primary(entries: &[(&str, u32)]) -> PrimaryIndex {
        PrimaryIndex {
            component_index: entries
                .iter()
                .map(|(id, c)| (id.to_string(), *c))
                .collect::<BTreeMap<_, _>>(),
            component_stats: Vec::new(),
            total_components: 0,
            total_nodes: entries.len(),
            total_edges: 0,
        }
    }

    #[test]
    fn pairs_are_strictly_sorted_by_identifier() {
        let primary = primary(&[("zeta/a", 2), ("Alpha/b", 0), ("alpha/a", 1), ("_x", 3)]);
        let compact = CompactIndex::build(&primary);

        let ids: Vec<&str> = compact.index.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["Alpha/b", "_x", "alpha/a", "zeta/a"]);
        assert!(compact.index.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(compact.total_models, 4);
    }

    #[test]
    fn serializes_pairs_as_arrays() {
        let primary = primary(&[("a/x", 7)]);
        let json = serde_json::to_value(CompactIndex::build(&primary)).unwrap();
        assert_eq!(json["index"][0][0], "a/x");
        assert_eq!(json["index"][0][1], 7);
        assert_eq!(json["total_models"], 1);
    }

    #[test]
    fn written_index_resolves_by_binary_search() {
        let dir = TempDir::new().unwrap();
        let primary = primary(&[("b/y", 1), ("a/x", 0), ("c/z", 2)]);
        CompactIndex::build(&primary).write(dir.path()).unwrap();

        let doc = CompactIndexDoc::load(dir.path()).unwrap();
        assert_eq!(doc.resolve("a/x"), Some(0));
        assert_eq!(doc.resolve("c/z"), Some(2));
        assert_eq!(doc.resolve("d/w"), None);
    }

    #[test]
    fn empty_primary_gives_empty_array() {
        let primary = primary(&[]);
        let compact = CompactIndex::build(&primary);
        assert!(compact.index.is_empty());
        assert_eq!(compact.total_models, 0);
    }
}
