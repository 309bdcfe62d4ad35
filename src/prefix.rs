use crate::artifact::{read_json_gz, write_json_gz};
use crate::config::KeyConfig;
use crate::index::PrimaryIndex;
use crate::keys::{file_stem, namespace_key};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const PREFIX_MANIFEST_FILE: &str = "lookup_index.json.gz";
pub const PREFIX_DIR: &str = "prefixes";

/// Relative path of the shard file for a namespace key.
pub fn shard_file(key: &str) -> String {
    format!("{PREFIX_DIR}/lookup_{}.json.gz", file_stem(key))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixShardInfo {
    pub file: String,
    pub count: usize,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrefixManifest {
    pub prefixes: Vec<String>,
    pub shards: BTreeMap<String, PrefixShardInfo>,
    pub total_models: usize,
}

/// Primary index split by owner namespace, one shard per namespace plus the
/// catch-all shard for identifiers without a separator.
pub struct PrefixChunks<'a> {
    shards: BTreeMap<&'a str, BTreeMap<&'a str, u32>>,
    total_models: usize,
}

impl<'a> PrefixChunks<'a> {
    pub fn build(primary: &'a PrimaryIndex, keys: &'a KeyConfig) -> Self {
        let mut shards: BTreeMap<&str, BTreeMap<&str, u32>> = BTreeMap::new();
        for (id, component_id) in primary.entries() {
            shards
                .entry(namespace_key(id, keys))
                .or_default()
                .insert(id, component_id);
        }
        Self {
            shards,
            total_models: primary.len(),
        }
    }

    pub fn shard(&self, key: &str) -> Option<&BTreeMap<&'a str, u32>> {
        self.shards.get(key)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn write(&self, output_dir: &Path) -> Result<PrefixManifest> {
        let mut shards = BTreeMap::new();
        for (key, entries) in &self.shards {
            let file = shard_file(key);
            let size = write_json_gz(&output_dir.join(&file), entries)?;
            debug!(prefix = key, models = entries.len(), bytes = size, "Prefix shard written");
            shards.insert(
                key.to_string(),
                PrefixShardInfo {
                    file,
                    count: entries.len(),
                    size_bytes: size,
                },
            );
        }

        let manifest = PrefixManifest {
            prefixes: shards.keys().cloned().collect(),
            shards,
            total_models: self.total_models,
        };
        let size = write_json_gz(&PrefixManifest::path(output_dir), &manifest)?;

        info!(
            prefixes = manifest.prefixes.len(),
            models = manifest.total_models,
            manifest_bytes = size,
            "Prefix lookup index created"
        );
        Ok(manifest)
    }
}

impl PrefixManifest {
    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(PREFIX_MANIFEST_FILE)
    }

    pub fn load(output_dir: &Path) -> Result<Self> {
        read_json_gz(&Self::path(output_dir))
    }
}

pub fn load_shard(output_dir: &Path, info: &PrefixShardInfo) -> Result<BTreeMap<String, u32>> {
    read_json_gz(&output_dir.join(&info.file))
}
