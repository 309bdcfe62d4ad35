use crate::artifact::{bytes_to_mb, read_json_gz, write_json_gz};
use crate::config::KeyConfig;
use crate::index::PrimaryIndex;
use crate::keys::{alpha_key, file_stem};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CHUNKS_MANIFEST_FILE: &str = "chunks_index.json.gz";
pub const CHUNKS_DIR: &str = "chunks";

/// Relative path of the chunk file for a bucket key.
pub fn chunk_file(key: &str) -> String {
    format!("{CHUNKS_DIR}/lookup_{}.json.gz", file_stem(key))
}

#[derive(Debug, Serialize)]
struct ChunkSer<'a, 'b> {
    prefix: &'a str,
    index: &'b BTreeMap<&'a str, u32>,
    count: usize,
}

/// One alphabetic chunk as read back from disk.
#[derive(Debug, Deserialize)]
pub struct ChunkDoc {
    pub prefix: String,
    pub index: BTreeMap<String, u32>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub file: String,
    pub count: usize,
    pub size_bytes: u64,
    pub size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSizeStats {
    pub min_mb: f64,
    pub max_mb: f64,
    pub avg_mb: f64,
}

impl ChunkSizeStats {
    /// `None` when there are no chunks.
    pub fn from_sizes(sizes: &[u64]) -> Option<Self> {
        let min = *sizes.iter().min()?;
        let max = *sizes.iter().max()?;
        let total: u64 = sizes.iter().sum();
        Some(Self {
            min_mb: bytes_to_mb(min),
            max_mb: bytes_to_mb(max),
            avg_mb: bytes_to_mb(total) / sizes.len() as f64,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunksManifest {
    pub chunks: BTreeMap<String, ChunkInfo>,
    pub total_chunks: usize,
    pub total_models: usize,
    pub size_stats: Option<ChunkSizeStats>,
}

/// Primary index split into two-character alphabetic buckets.
pub struct AlphaChunks<'a> {
    buckets: BTreeMap<String, BTreeMap<&'a str, u32>>,
    total_models: usize,
}

impl<'a> AlphaChunks<'a> {
    pub fn build(primary: &'a PrimaryIndex, keys: &KeyConfig) -> Self {
        let mut buckets: BTreeMap<String, BTreeMap<&str, u32>> = BTreeMap::new();
        for (id, component_id) in primary.entries() {
            buckets
                .entry(alpha_key(id, keys))
                .or_default()
                .insert(id, component_id);
        }
        Self {
            buckets,
            total_models: primary.len(),
        }
    }

    pub fn bucket(&self, key: &str) -> Option<&BTreeMap<&'a str, u32>> {
        self.buckets.get(key)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Writes chunks in key order, then the manifest.
    pub fn write(&self, output_dir: &Path) -> Result<ChunksManifest> {
        let mut chunks = BTreeMap::new();
        let mut sizes = Vec::with_capacity(self.buckets.len());

        for (key, entries) in &self.buckets {
            let file = chunk_file(key);
            let chunk = ChunkSer {
                prefix: key,
                index: entries,
                count: entries.len(),
            };
            let size = write_json_gz(&output_dir.join(&file), &chunk)?;
            debug!(prefix = %key, models = entries.len(), bytes = size, "Chunk written");

            sizes.push(size);
            chunks.insert(
                key.clone(),
                ChunkInfo {
                    file,
                    count: entries.len(),
                    size_bytes: size,
                    size_mb: bytes_to_mb(size),
                },
            );
        }

        let manifest = ChunksManifest {
            total_chunks: chunks.len(),
            chunks,
            total_models: self.total_models,
            size_stats: ChunkSizeStats::from_sizes(&sizes),
        };
        write_json_gz(&ChunksManifest::path(output_dir), &manifest)?;

        match &manifest.size_stats {
            Some(s) => info!(
                chunks = manifest.total_chunks,
                models = manifest.total_models,
                min_mb = s.min_mb,
                max_mb = s.max_mb,
                avg_mb = s.avg_mb,
                "Chunked lookup index created"
            ),
            None => info!(models = 0, "Chunked lookup index created with no chunks"),
        }
        Ok(manifest)
    }
}

impl ChunksManifest {
    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(CHUNKS_MANIFEST_FILE)
    }

    pub fn load(output_dir: &Path) -> Result<Self> {
        read_json_gz(&Self::path(output_dir))
    }
}

pub fn load_chunk(output_dir: &Path, info: &ChunkInfo) -> Result<ChunkDoc> {
    read_json_gz(&output_dir.join(&info.file))
}
