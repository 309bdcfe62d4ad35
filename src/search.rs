use crate::artifact::{read_json_gz, write_json_gz};
use crate::index::PrimaryIndex;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const SEARCH_INDEX_FILE: &str = "search_index.json.gz";

/// Sorted identifiers only, for client-side autocomplete. Carries no routing.
#[derive(Debug, Serialize)]
pub struct SearchIndex<'a> {
    pub model_ids: Vec<&'a str>,
    pub total_models: usize,
}

#[derive(Debug, Deserialize)]
pub struct SearchIndexDoc {
    pub model_ids: Vec<String>,
    pub total_models: usize,
}

impl<'a> SearchIndex<'a> {
    pub fn build(primary: &'a PrimaryIndex) -> Self {
        let model_ids: Vec<&str> = primary.entries().map(|(id, _)| id).collect();
        Self {
            total_models: model_ids.len(),
            model_ids,
        }
    }

    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(SEARCH_INDEX_FILE)
    }

    pub fn write(&self, output_dir: &Path) -> Result<u64> {
        let size = write_json_gz(&Self::path(output_dir), self)?;
        info!(
            models = self.total_models,
            bytes = size,
            "Search index created"
        );
        Ok(size)
    }
}

impl SearchIndexDoc {
    pub fn load(output_dir: &Path) -> Result<Self> {
        read_json_gz(&SearchIndex::path(output_dir))
    }

    /// Identifiers starting with `prefix`, in sorted order.
    pub fn complete<'s>(&'s self, prefix: &'s str) -> impl Iterator<Item = &'s str> + 's {
        let start = self.model_ids.partition_point(|id| id.as_str() < prefix);
        self.model_ids[start..]
            .iter()
            .take_while(move |id| id.starts_with(prefix))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn primary(ids: &[&str]) -> PrimaryIndex {
        PrimaryIndex {
            component_index: ids
                .iter()
                .enumerate()
                .map(|(i, id)| (id.to_string(), i as u32))
                .collect(),
            component_stats: Vec::new(),
            total_components: ids.len(),
            total_nodes: ids.len(),
            total_edges: 0,
        }
    }

    #[test]
    fn ids_sorted_without_component_ids() {
        let primary = primary(&["b/y", "a/x", "c/z"]);
        let search = SearchIndex::build(&primary);
        assert_eq!(search.model_ids, vec!["a/x", "b/y", "c/z"]);
        assert_eq!(search.total_models, 3);

        let json = serde_json::to_value(&search).unwrap();
        assert!(json.get("index").is_none());
    }

    #[test]
    fn length_matches_primary_with_no_duplicates() {
        let primary = primary(&["m", "a/1", "a/2", "z"]);
        let search = SearchIndex::build(&primary);
        assert_eq!(search.model_ids.len(), primary.len());
        assert!(search.model_ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn written_index_supports_prefix_completion() {
        let dir = TempDir::new().unwrap();
        let primary = primary(&["meta/llama-2", "meta/llama-3", "metal/x", "mistral/7b"]);
        SearchIndex::build(&primary).write(dir.path()).unwrap();

        let doc = SearchIndexDoc::load(dir.path()).unwrap();
        assert_eq!(doc.total_models, 4);
        let hits: Vec<&str> = doc.complete("meta/").collect();
        assert_eq!(hits, vec!["meta/llama-2", "meta/llama-3"]);
        assert_eq!(doc.complete("zzz").count(), 0);
    }
}
