use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use graphshard::config::{
    BuildConfig, KeyConfig, ALPHA_FALLBACK_KEY, ALPHA_FILLER, CATCH_ALL_SHARD,
    DEFAULT_ATTRIBUTES, DEFAULT_UPLOAD_WORKERS, NAMESPACE_SEPARATOR, UPLOAD_CONTENT_ENCODING,
    UPLOAD_CONTENT_TYPE,
};
use graphshard::sample::SampleOptions;
use graphshard::upload::{LocalDirStore, ObjectMeta, UploadConfig, UploadSelection};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "graphshard")]
#[command(about = "Shard a model-derivation graph into static lookup artifacts")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild component artifacts and every lookup index
    Build(BuildArgs),
    /// Publish built artifacts to an object store
    Upload(UploadArgs),
    /// Check that all index formats agree with the primary index
    Verify(VerifyArgs),
    /// Resolve one model identifier the way a client does
    Lookup(LookupArgs),
    /// Write a small connected sample of a graph
    Sample(SampleArgs),
}

#[derive(Args)]
struct KeyArgs {
    /// Separator between owner namespace and model name
    #[arg(long, default_value_t = NAMESPACE_SEPARATOR)]
    separator: char,

    /// Prefix shard for identifiers without a separator
    #[arg(long, default_value = CATCH_ALL_SHARD)]
    catch_all: String,

    /// Pad character for single-character alphabetic keys
    #[arg(long, default_value_t = ALPHA_FILLER)]
    filler: char,

    /// Alphabetic bucket for identifiers with a non-alphanumeric first character
    #[arg(long, default_value = ALPHA_FALLBACK_KEY)]
    fallback: String,
}

impl From<KeyArgs> for KeyConfig {
    fn from(args: KeyArgs) -> Self {
        KeyConfig {
            separator: args.separator,
            catch_all: args.catch_all,
            filler: args.filler,
            fallback: args.fallback,
        }
    }
}

#[derive(Args)]
struct BuildArgs {
    /// Path to the node-link graph document (.json, .json.bz2 or .json.gz)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for generated artifacts
    #[arg(short, long)]
    output: PathBuf,

    /// Node attributes to copy into component artifacts (comma separated)
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_ATTRIBUTES.iter().map(|a| a.to_string()))]
    attributes: Vec<String>,

    /// Also drop files in the output directory that no build wrote
    #[arg(long)]
    clean: bool,

    #[command(flatten)]
    keys: KeyArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum SelectionArg {
    All,
    Chunks,
}

impl From<SelectionArg> for UploadSelection {
    fn from(arg: SelectionArg) -> Self {
        match arg {
            SelectionArg::All => UploadSelection::All,
            SelectionArg::Chunks => UploadSelection::Chunks,
        }
    }
}

#[derive(Args)]
struct UploadArgs {
    /// Directory containing built artifacts
    #[arg(short, long)]
    output: PathBuf,

    /// Destination directory standing in for the bucket
    #[arg(long)]
    dest: PathBuf,

    /// Max concurrent uploads
    #[arg(long, default_value_t = DEFAULT_UPLOAD_WORKERS)]
    workers: usize,

    /// Which artifacts to publish
    #[arg(long, value_enum, default_value_t = SelectionArg::All)]
    selection: SelectionArg,

    #[arg(long, default_value = UPLOAD_CONTENT_TYPE)]
    content_type: String,

    #[arg(long, default_value = UPLOAD_CONTENT_ENCODING)]
    content_encoding: String,
}

#[derive(Args)]
struct VerifyArgs {
    /// Directory containing built artifacts
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    keys: KeyArgs,
}

#[derive(Args)]
struct LookupArgs {
    /// Directory containing built artifacts
    #[arg(short, long)]
    output: PathBuf,

    /// Model identifier, e.g. "meta-llama/Llama-3-8B"
    id: String,

    #[command(flatten)]
    keys: KeyArgs,
}

#[derive(Args)]
struct SampleArgs {
    /// Path to the full graph document
    #[arg(short, long)]
    input: PathBuf,

    /// Path of the sample to write (.gz selects gzip)
    #[arg(short, long)]
    output: PathBuf,

    /// Start identifier (defaults to the first node with an edge)
    #[arg(long)]
    start: Option<String>,

    /// Stop after this many nodes
    #[arg(long)]
    max_nodes: Option<usize>,
}

fn run_build(args: BuildArgs) -> Result<()> {
    let config = BuildConfig {
        input: args.input,
        output_dir: args.output,
        attributes: args.attributes,
        keys: args.keys.into(),
        clean: args.clean,
    };
    let report = graphshard::pipeline::run_build(&config)?;

    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", report.elapsed.as_secs_f64());
    println!();
    println!("Models:             {}", report.total_nodes);
    println!("Edges:              {}", report.total_edges);
    println!("Components:         {}", report.total_components);
    println!("Component bytes:    {}", report.component_bytes);
    println!("Primary index:      {} bytes", report.primary_index_bytes);
    println!("Compact index:      {} bytes", report.compact_index_bytes);
    println!("Search index:       {} bytes", report.search_index_bytes);
    println!("Prefix shards:      {}", report.prefix_shards);
    println!("Alphabetic chunks:  {}", report.alpha_chunks);
    println!("Missing attributes: {}", report.missing_attributes);
    println!();
    println!("Component sizes:");
    for (label, count) in report.size_distribution.rows() {
        println!("  {:<12} {}", label, count);
    }

    Ok(())
}

fn run_upload(args: UploadArgs) -> Result<()> {
    let mut config = UploadConfig::new(args.output);
    config.workers = args.workers;
    config.selection = args.selection.into();
    config.meta = ObjectMeta {
        content_type: args.content_type,
        content_encoding: args.content_encoding,
    };
    let store = Arc::new(LocalDirStore::new(args.dest));

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("graphshard-upload-worker")
        .enable_time()
        .build()?;
    let report = rt.block_on(graphshard::upload::run_upload(&config, store))?;

    println!();
    println!("=== Upload ===");
    println!("Uploaded:           {}", report.succeeded.len());
    println!("Bytes:              {}", report.uploaded_bytes());
    println!("Failed:             {}", report.failed.len());
    for failure in &report.failed {
        println!("  {} ({})", failure.key, failure.error);
    }

    report.ensure_complete()
}

fn run_verify(args: VerifyArgs) -> Result<()> {
    let keys: KeyConfig = args.keys.into();
    keys.validate()?;
    let report = graphshard::verify::verify_artifacts(&args.output, &keys)?;

    println!("Models checked:     {}", report.models_checked);
    println!("Components checked: {}", report.components_checked);
    println!("Violations:         {}", report.violations.len());
    for violation in &report.violations {
        println!("  {violation}");
    }

    if !report.is_consistent() {
        bail!(
            "Artifacts are inconsistent ({} violations)",
            report.violations.len()
        );
    }
    Ok(())
}

fn run_lookup(args: LookupArgs) -> Result<()> {
    let keys: KeyConfig = args.keys.into();
    keys.validate()?;
    match graphshard::verify::resolve(&args.output, &args.id, &keys)? {
        Some(resolution) => {
            println!("Component:          {}", resolution.component_id);
            println!("Chunk:              {}", resolution.chunk_file);
            println!("Artifact:           {}", resolution.component_file.display());
            Ok(())
        }
        None => bail!("Model not found: {}", args.id),
    }
}

fn run_sample(args: SampleArgs) -> Result<()> {
    let options = SampleOptions {
        start: args.start,
        max_nodes: args.max_nodes,
    };
    let metadata = graphshard::sample::run_sample(&args.input, &args.output, &options)?;
    println!(
        "Mini sample: {} nodes, {} edges (from {} nodes)",
        metadata.total_nodes, metadata.total_edges, metadata.original_size
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Build(args) => run_build(args),
        Commands::Upload(args) => run_upload(args),
        Commands::Verify(args) => run_verify(args),
        Commands::Lookup(args) => run_lookup(args),
        Commands::Sample(args) => run_sample(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
