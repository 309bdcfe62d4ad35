use crate::alpha::{AlphaChunks, CHUNKS_DIR};
use crate::compact::CompactIndex;
use crate::component::write_components;
use crate::config::BuildConfig;
use crate::graph::ModelGraph;
use crate::index::PrimaryIndex;
use crate::partition::connected_components;
use crate::prefix::{PrefixChunks, PREFIX_DIR};
use crate::search::SearchIndex;
use crate::stats::{BuildStats, SizeDistribution};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of a full rebuild.
#[derive(Debug)]
pub struct BuildReport {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub total_components: usize,
    pub component_bytes: u64,
    pub primary_index_bytes: u64,
    pub compact_index_bytes: u64,
    pub search_index_bytes: u64,
    pub prefix_shards: usize,
    pub alpha_chunks: usize,
    pub missing_attributes: u64,
    pub size_distribution: SizeDistribution,
    pub elapsed: Duration,
}

/// Runs a full rebuild: load, partition, write components, then the primary
/// index, then every derived index. Everything is written into a staging
/// sibling of the output directory which replaces the output only once the
/// whole set is complete, so readers never see stale shards from an earlier
/// run or a half-written set from a failed one.
pub fn run_build(config: &BuildConfig) -> Result<BuildReport> {
    let start = Instant::now();
    config.validate()?;

    // Load before touching the output so a bad input leaves old artifacts alone.
    let graph = ModelGraph::load(&config.input)
        .with_context(|| format!("Failed to load graph: {}", config.input.display()))?;

    let staging = sibling_dir(&config.output_dir, "staging")?;
    reset_dir(&staging)?;
    build_and_publish(&graph, config, &staging, start)
}

/// `<output>.<suffix>`, next to the output so the final swap is a rename.
fn sibling_dir(output_dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = output_dir.file_name().with_context(|| {
        format!(
            "Output path has no directory name: {}",
            output_dir.display()
        )
    })?;
    let mut sibling = name.to_os_string();
    sibling.push(".");
    sibling.push(suffix);
    Ok(output_dir.with_file_name(sibling))
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!("Removing leftover directory: {}", dir.display());
        fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove directory: {}", dir.display()))?;
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

fn build_and_publish(
    graph: &ModelGraph,
    config: &BuildConfig,
    staging: &Path,
    start: Instant,
) -> Result<BuildReport> {
    let report = match build_from_graph(graph, config, staging, start) {
        Ok(report) => report,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(staging) {
                warn!(
                    error = %cleanup,
                    "Failed to remove staging directory: {}",
                    staging.display()
                );
            }
            return Err(e.context("Rebuild failed, previous artifacts left in place"));
        }
    };
    publish(staging, &config.output_dir, config.clean)?;

    info!(
        components = report.total_components,
        nodes = report.total_nodes,
        duration_secs = start.elapsed().as_secs_f64(),
        "Rebuild complete"
    );
    Ok(report)
}

/// Writes every artifact straight into `out`.
fn build_from_graph(
    graph: &ModelGraph,
    config: &BuildConfig,
    out: &Path,
    start: Instant,
) -> Result<BuildReport> {
    let partition = connected_components(graph);

    let stats = BuildStats::new();
    let component_stats = write_components(
        graph,
        &partition,
        out,
        &config.attributes,
        &config.keys,
        &stats,
    )?;
    let size_distribution = SizeDistribution::from_sizes(component_stats.iter().map(|s| s.nodes));

    let primary = PrimaryIndex::build(graph, &partition, component_stats)?;
    let primary_index_bytes = primary.write(out)?;

    let compact_index_bytes = CompactIndex::build(&primary).write(out)?;
    let prefix_manifest = PrefixChunks::build(&primary, &config.keys).write(out)?;
    let chunks_manifest = AlphaChunks::build(&primary, &config.keys).write(out)?;
    let search_index_bytes = SearchIndex::build(&primary).write(out)?;

    Ok(BuildReport {
        total_nodes: primary.total_nodes,
        total_edges: primary.total_edges,
        total_components: primary.total_components,
        component_bytes: stats.bytes(),
        primary_index_bytes,
        compact_index_bytes,
        search_index_bytes,
        prefix_shards: prefix_manifest.prefixes.len(),
        alpha_chunks: chunks_manifest.total_chunks,
        missing_attributes: stats.missing(),
        size_distribution,
        elapsed: start.elapsed(),
    })
}

/// Top-level entries of an output directory that a build owns.
fn is_artifact_entry(name: &str) -> bool {
    name.ends_with(".json.gz")
        || name.ends_with(".json.gz.tmp")
        || name == PREFIX_DIR
        || name == CHUNKS_DIR
}

/// Moves everything in `output_dir` that is not a build artifact into `staging`.
fn carry_over(output_dir: &Path, staging: &Path) -> Result<()> {
    let entries = fs::read_dir(output_dir)
        .with_context(|| format!("Failed to read directory: {}", output_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_str().is_some_and(is_artifact_entry) {
            continue;
        }
        let target = staging.join(&name);
        fs::rename(entry.path(), &target)
            .with_context(|| format!("Failed to carry over {:?}", entry.path()))?;
        debug!("Carried over: {}", target.display());
    }
    Ok(())
}

/// Swaps the finished staging directory into place. Without `clean`, files in
/// the old output that are not build artifacts survive the swap.
fn publish(staging: &Path, output_dir: &Path, clean: bool) -> Result<()> {
    // Staging was created next to the output, so the parent already exists.
    if !output_dir.exists() {
        return fs::rename(staging, output_dir).with_context(|| {
            format!("Failed to move artifacts into: {}", output_dir.display())
        });
    }

    if clean {
        info!("Cleaning output directory: {}", output_dir.display());
    } else {
        carry_over(output_dir, staging)?;
    }

    let retired = sibling_dir(output_dir, "previous")?;
    if retired.exists() {
        fs::remove_dir_all(&retired)
            .with_context(|| format!("Failed to remove directory: {}", retired.display()))?;
    }
    fs::rename(output_dir, &retired)
        .with_context(|| format!("Failed to retire output directory: {}", output_dir.display()))?;

    if let Err(e) = fs::rename(staging, output_dir) {
        if let Err(restore) = fs::rename(&retired, output_dir) {
            warn!(
                error = %restore,
                "Failed to restore previous artifacts from: {}",
                retired.display()
            );
        }
        return Err(e).with_context(|| {
            format!(
                "Failed to move artifacts into {}; new set kept in {}",
                output_dir.display(),
                staging.display()
            )
        });
    }

    if let Err(e) = fs::remove_dir_all(&retired) {
        warn!(error = %e, "Failed to remove previous artifacts: {}", retired.display());
    }
    Ok(())
}
