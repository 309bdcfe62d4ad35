//! Reads a finished artifact set back from disk and checks that every index
//! format agrees with the primary index.

use crate::alpha::{load_chunk, ChunksManifest, CHUNKS_MANIFEST_FILE};
use crate::artifact::read_json_gz;
use crate::compact::{CompactIndexDoc, COMPACT_INDEX_FILE};
use crate::component::{component_file_name, component_path};
use crate::config::KeyConfig;
use crate::index::{PrimaryIndex, PRIMARY_INDEX_FILE};
use crate::keys::{alpha_key, namespace_key};
use crate::models::ComponentDocument;
use crate::prefix::{load_shard, PrefixManifest, PREFIX_MANIFEST_FILE};
use crate::search::{SearchIndexDoc, SEARCH_INDEX_FILE};
use crate::upload::{collect_artifacts, UploadSelection};
use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub models_checked: usize,
    pub components_checked: usize,
    pub violations: Vec<String>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }

    fn violation(&mut self, message: String) {
        warn!("{message}");
        self.violations.push(message);
    }
}

/// Where an identifier sits in a sharded format: shard key and component id.
type Placement = BTreeMap<String, (String, u32)>;

pub fn verify_artifacts(output_dir: &Path, keys: &KeyConfig) -> Result<VerifyReport> {
    let primary = PrimaryIndex::load(output_dir).context("Failed to load primary index")?;
    let mut report = VerifyReport {
        models_checked: primary.len(),
        ..VerifyReport::default()
    };

    check_primary_totals(&primary, &mut report);
    check_compact(output_dir, &primary, &mut report)?;
    check_prefix_shards(output_dir, &primary, keys, &mut report)?;
    check_alpha_chunks(output_dir, &primary, keys, &mut report)?;
    check_search(output_dir, &primary, &mut report)?;
    check_components(output_dir, &primary, &mut report)?;
    check_unreferenced(output_dir, &primary, &mut report)?;

    info!(
        models = report.models_checked,
        components = report.components_checked,
        violations = report.violations.len(),
        "Verification finished"
    );
    Ok(report)
}

fn check_primary_totals(primary: &PrimaryIndex, report: &mut VerifyReport) {
    if primary.len() != primary.total_nodes {
        report.violation(format!(
            "primary index: {} keys but total_nodes is {}",
            primary.len(),
            primary.total_nodes
        ));
    }
    let nodes: usize = primary.component_stats.iter().map(|s| s.nodes).sum();
    if nodes != primary.total_nodes {
        report.violation(format!(
            "primary index: component node counts sum to {nodes}, total_nodes is {}",
            primary.total_nodes
        ));
    }
    let edges: usize = primary.component_stats.iter().map(|s| s.edges).sum();
    if edges != primary.total_edges {
        report.violation(format!(
            "primary index: component edge counts sum to {edges}, total_edges is {}",
            primary.total_edges
        ));
    }
}

fn check_compact(
    output_dir: &Path,
    primary: &PrimaryIndex,
    report: &mut VerifyReport,
) -> Result<()> {
    let compact = CompactIndexDoc::load(output_dir).context("Failed to load compact index")?;

    if let Some(pair) = compact.index.windows(2).find(|w| w[0].0 >= w[1].0) {
        report.violation(format!(
            "compact index: {:?} is not strictly before {:?}",
            pair[0].0, pair[1].0
        ));
    }
    if compact.total_models != primary.len() || compact.index.len() != primary.len() {
        report.violation(format!(
            "compact index: {} pairs, total_models {}, primary has {}",
            compact.index.len(),
            compact.total_models,
            primary.len()
        ));
    }
    for (id, component_id) in &compact.index {
        match primary.resolve(id) {
            Some(expected) if expected == *component_id => {}
            Some(expected) => report.violation(format!(
                "compact index: {id:?} maps to {component_id}, primary says {expected}"
            )),
            None => report.violation(format!("compact index: unknown identifier {id:?}")),
        }
    }
    Ok(())
}

/// Compares a sharded format against the primary index. `expected_key` names
/// the shard every identifier must live in.
fn check_placement(
    format: &str,
    placement: &Placement,
    primary: &PrimaryIndex,
    expected_key: impl Fn(&str) -> String,
    report: &mut VerifyReport,
) {
    for (id, component_id) in primary.entries() {
        match placement.get(id) {
            None => report.violation(format!("{format}: {id:?} is missing")),
            Some((key, found)) => {
                if *found != component_id {
                    report.violation(format!(
                        "{format}: {id:?} maps to {found}, primary says {component_id}"
                    ));
                }
                let expected = expected_key(id);
                if *key != expected {
                    report.violation(format!(
                        "{format}: {id:?} is in shard {key:?}, expected {expected:?}"
                    ));
                }
            }
        }
    }
    for id in placement.keys() {
        if primary.resolve(id).is_none() {
            report.violation(format!("{format}: unknown identifier {id:?}"));
        }
    }
}

/// Records `id` in `placement`, flagging identifiers that appear in two shards.
fn place(
    format: &str,
    placement: &mut Placement,
    key: &str,
    id: String,
    component_id: u32,
    report: &mut VerifyReport,
) {
    if let Some((previous, _)) = placement.get(&id) {
        report.violation(format!(
            "{format}: {id:?} appears in shards {previous:?} and {key:?}"
        ));
        return;
    }
    placement.insert(id, (key.to_string(), component_id));
}

fn check_prefix_shards(
    output_dir: &Path,
    primary: &PrimaryIndex,
    keys: &KeyConfig,
    report: &mut VerifyReport,
) -> Result<()> {
    const FORMAT: &str = "prefix shards";
    let manifest = PrefixManifest::load(output_dir).context("Failed to load prefix manifest")?;

    if manifest.total_models != primary.len() {
        report.violation(format!(
            "{FORMAT}: manifest total_models {} but primary has {}",
            manifest.total_models,
            primary.len()
        ));
    }
    let listed: Vec<&String> = manifest.shards.keys().collect();
    if manifest.prefixes.iter().collect::<Vec<_>>() != listed {
        report.violation(format!("{FORMAT}: prefixes list does not match shard table"));
    }

    let mut placement = Placement::new();
    for (key, info) in &manifest.shards {
        let shard = load_shard(output_dir, info)?;
        if shard.len() != info.count {
            report.violation(format!(
                "{FORMAT}: shard {key:?} holds {} entries, manifest says {}",
                shard.len(),
                info.count
            ));
        }
        for (id, component_id) in shard {
            place(FORMAT, &mut placement, key, id, component_id, report);
        }
    }

    check_placement(
        FORMAT,
        &placement,
        primary,
        |id| namespace_key(id, keys).to_string(),
        report,
    );
    Ok(())
}

fn check_alpha_chunks(
    output_dir: &Path,
    primary: &PrimaryIndex,
    keys: &KeyConfig,
    report: &mut VerifyReport,
) -> Result<()> {
    const FORMAT: &str = "alphabetic chunks";
    let manifest = ChunksManifest::load(output_dir).context("Failed to load chunks manifest")?;

    if manifest.total_models != primary.len() {
        report.violation(format!(
            "{FORMAT}: manifest total_models {} but primary has {}",
            manifest.total_models,
            primary.len()
        ));
    }
    if manifest.total_chunks != manifest.chunks.len() {
        report.violation(format!(
            "{FORMAT}: total_chunks {} but {} chunks listed",
            manifest.total_chunks,
            manifest.chunks.len()
        ));
    }

    let mut placement = Placement::new();
    for (key, info) in &manifest.chunks {
        let chunk = load_chunk(output_dir, info)?;
        if chunk.prefix != *key {
            report.violation(format!(
                "{FORMAT}: file {:?} declares prefix {:?}, manifest key is {key:?}",
                info.file, chunk.prefix
            ));
        }
        if chunk.index.len() != chunk.count || chunk.count != info.count {
            report.violation(format!(
                "{FORMAT}: chunk {key:?} holds {} entries, count {} and manifest {}",
                chunk.index.len(),
                chunk.count,
                info.count
            ));
        }
        for (id, component_id) in chunk.index {
            place(FORMAT, &mut placement, key, id, component_id, report);
        }
    }

    check_placement(FORMAT, &placement, primary, |id| alpha_key(id, keys), report);
    Ok(())
}

fn check_search(
    output_dir: &Path,
    primary: &PrimaryIndex,
    report: &mut VerifyReport,
) -> Result<()> {
    let search = SearchIndexDoc::load(output_dir).context("Failed to load search index")?;
    if search.total_models != search.model_ids.len() {
        report.violation(format!(
            "search index: total_models {} but {} identifiers",
            search.total_models,
            search.model_ids.len()
        ));
    }
    let expected: Vec<&str> = primary.entries().map(|(id, _)| id).collect();
    let found: Vec<&str> = search.model_ids.iter().map(String::as_str).collect();
    if expected != found {
        report.violation(format!(
            "search index: {} identifiers differ from the {} primary keys",
            found.len(),
            expected.len()
        ));
    }
    Ok(())
}

fn check_components(
    output_dir: &Path,
    primary: &PrimaryIndex,
    report: &mut VerifyReport,
) -> Result<()> {
    for stats in &primary.component_stats {
        let path = component_path(output_dir, stats.component_id);
        let doc: ComponentDocument = read_json_gz(&path)?;
        report.components_checked += 1;

        if doc.metadata.component_id != stats.component_id
            || doc.nodes.len() != stats.nodes
            || doc.edges.len() != stats.edges
        {
            report.violation(format!(
                "component {}: artifact has {} nodes / {} edges, stats say {} / {}",
                stats.component_id,
                doc.nodes.len(),
                doc.edges.len(),
                stats.nodes,
                stats.edges
            ));
        }
        for node in &doc.nodes {
            if primary.resolve(&node.id) != Some(stats.component_id) {
                report.violation(format!(
                    "component {}: member {:?} is not mapped to it",
                    stats.component_id, node.id
                ));
            }
        }
    }
    if report.components_checked != primary.total_components {
        report.violation(format!(
            "primary index: {} component stats, total_components is {}",
            report.components_checked, primary.total_components
        ));
    }
    Ok(())
}

/// Every `.json.gz` in the output must be named by a manifest or by the
/// component stats, otherwise an upload would publish it.
fn check_unreferenced(
    output_dir: &Path,
    primary: &PrimaryIndex,
    report: &mut VerifyReport,
) -> Result<()> {
    let mut referenced: BTreeSet<String> = [
        PRIMARY_INDEX_FILE,
        COMPACT_INDEX_FILE,
        PREFIX_MANIFEST_FILE,
        CHUNKS_MANIFEST_FILE,
        SEARCH_INDEX_FILE,
    ]
    .into_iter()
    .map(String::from)
    .collect();
    referenced.extend(
        primary
            .component_stats
            .iter()
            .map(|s| component_file_name(s.component_id)),
    );
    let prefixes = PrefixManifest::load(output_dir).context("Failed to load prefix manifest")?;
    referenced.extend(prefixes.shards.into_values().map(|info| info.file));
    let chunks = ChunksManifest::load(output_dir).context("Failed to load chunks manifest")?;
    referenced.extend(chunks.chunks.into_values().map(|info| info.file));

    for (key, _) in collect_artifacts(output_dir, UploadSelection::All)? {
        if !referenced.contains(&key) {
            report.violation(format!("unreferenced artifact {key:?}"));
        }
    }
    Ok(())
}

/// Result of resolving one identifier the way a client does.
#[derive(Debug, PartialEq)]
pub struct Resolution {
    pub component_id: u32,
    pub chunk_file: String,
    pub component_file: PathBuf,
}

/// Resolves `id` through the alphabetic manifest and chunk, then cross-checks
/// the prefix shard. Returns `Ok(None)` when the identifier is unknown.
pub fn resolve(output_dir: &Path, id: &str, keys: &KeyConfig) -> Result<Option<Resolution>> {
    let manifest = ChunksManifest::load(output_dir).context("Failed to load chunks manifest")?;
    let key = alpha_key(id, keys);
    let Some(info) = manifest.chunks.get(&key) else {
        return Ok(None);
    };
    let chunk = load_chunk(output_dir, info)?;
    let Some(&component_id) = chunk.index.get(id) else {
        return Ok(None);
    };

    let prefixes = PrefixManifest::load(output_dir).context("Failed to load prefix manifest")?;
    let namespace = namespace_key(id, keys);
    let from_prefix = match prefixes.shards.get(namespace) {
        Some(info) => load_shard(output_dir, info)?.get(id).copied(),
        None => None,
    };
    if from_prefix != Some(component_id) {
        bail!(
            "Index formats disagree for {id:?}: chunk {key:?} says {component_id}, \
             prefix shard {namespace:?} says {from_prefix:?}"
        );
    }

    Ok(Some(Resolution {
        component_id,
        chunk_file: info.file.clone(),
        component_file: component_path(output_dir, component_id),
    }))
}
