//! tuw CLI
//!
//! Session dump → runs → selection → recording clips

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use tuw_core::analysis::SummaryRow;
use tuw_core::export::save_concat_list;
use tuw_core::telemetry::FlagChanges;
use tuw_core::{
    classify, ClipMapper, ClipPlan, ClipSegment, DensityClusterer, ExtractConfig, ExtractionSummary,
    PolicyKind, RecordingCatalog, RunInclusion, RunSummary, SessionAnalysis, StateDump,
};

#[derive(Parser)]
#[command(name = "tuw")]
#[command(version = tuw_core::VERSION)]
#[command(about = "Pick the runs worth rewatching from platformer session dumps", long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a dump file
    Inspect {
        /// Session dump file
        dump: PathBuf,
    },

    /// List the runs of a dump as JSON
    Runs {
        /// Session dump file
        dump: PathBuf,

        /// Segmentation policy (death, room, clip)
        #[arg(long, value_parser = parse_policy, default_value = "clip")]
        policy: PolicyKind,
    },

    /// Classify runs across dump files and print the selection
    Extract {
        /// Session dump files
        #[arg(required = true)]
        dumps: Vec<PathBuf>,

        /// Extraction config JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Comma-separated death-count allow-list, e.g. "420, 1337"
        #[arg(long)]
        numbers: Option<String>,
    },

    /// Map selected runs onto recordings
    Clips {
        /// Session dump files
        #[arg(required = true)]
        dumps: Vec<PathBuf>,

        /// Recording catalog (name,event,timestamp entries)
        #[arg(long)]
        catalog: PathBuf,

        /// Extraction config JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write a concat list for an external encoder
        #[arg(long)]
        concat: Option<PathBuf>,
    },

    /// Config file helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default config
    Init {
        path: PathBuf,

        /// Replace an existing file
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

fn parse_policy(name: &str) -> std::result::Result<PolicyKind, String> {
    PolicyKind::from_name(name).ok_or_else(|| format!("unknown policy '{}' (death, room, clip)", name))
}

// ============================================================================
// Output shapes
// ============================================================================

#[derive(Serialize)]
struct InspectReport<'a> {
    dump: &'a Path,
    states: usize,
    skipped: usize,
    map: Option<&'a str>,
    chapter: Option<&'a str>,
    rooms: Vec<&'a str>,
    changed_flags: Vec<&'a str>,
}

#[derive(Serialize)]
struct FileSelection {
    dump: PathBuf,
    runs: Vec<SelectedRun>,
}

#[derive(Serialize)]
struct SelectedRun {
    #[serde(flatten)]
    inclusion: RunInclusion,
    run: RunSummary,
}

#[derive(Serialize)]
struct ExtractReport {
    summary: Vec<SummaryRow>,
    /// Flag toggle counts summed over every file
    flag_changes: FlagChanges,
    files: Vec<FileSelection>,
}

#[derive(Serialize)]
struct ClipsReport<'a> {
    clips: &'a [ClipSegment],
    warnings: &'a [String],
    total_duration: f64,
}

// ============================================================================
// Commands
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Inspect { dump } => inspect(&dump),
        Commands::Runs { dump, policy } => list_runs(&dump, policy),
        Commands::Extract { dumps, config, numbers } => {
            let config = load_config(config.as_deref(), numbers.as_deref())?;
            print_json(&extract(&dumps, &config)?)
        }
        Commands::Clips { dumps, catalog, config, concat } => {
            let config = load_config(config.as_deref(), None)?;
            clips(&dumps, &catalog, &config, concat.as_deref())
        }
        Commands::Config { command: ConfigCommands::Init { path, force } } => init_config(&path, force),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&Path>, numbers: Option<&str>) -> Result<ExtractConfig> {
    let mut config = match path {
        Some(path) => ExtractConfig::load(path).with_context(|| format!("Failed to load config: {:?}", path))?,
        None => ExtractConfig::default(),
    };

    if let Some(text) = numbers {
        if !config.apply_numbers(text) {
            log::warn!("Ignoring --numbers '{}'; keeping allow-list {}", text, config.numbers_text());
        }
    }

    Ok(config)
}

fn inspect(path: &Path) -> Result<()> {
    let dump = StateDump::open(path)?;

    print_json(&InspectReport {
        dump: path,
        states: dump.len(),
        skipped: dump.skipped,
        map: dump.map.as_deref(),
        chapter: dump.chapter.as_deref(),
        rooms: dump.rooms.iter().map(String::as_str).collect(),
        changed_flags: dump.flag_changes.changed().collect(),
    })
}

fn list_runs(path: &Path, policy: PolicyKind) -> Result<()> {
    let dump = StateDump::open(path)?;
    let runs = tuw_core::extract_runs(&dump.states, policy);
    log::info!("{} runs in {:?}", runs.len(), path);

    let summaries: Vec<RunSummary> = runs.iter().enumerate().map(|(i, run)| run.summary(i)).collect();
    print_json(&summaries)
}

/// Classify every dump, merging the per-file tallies and flag changes.
fn extract(paths: &[PathBuf], config: &ExtractConfig) -> Result<ExtractReport> {
    let clusterer = DensityClusterer::new(config.cluster.min_cluster_size);
    let mut summary = ExtractionSummary::default();
    let mut flag_changes = FlagChanges::new();
    let mut files = Vec::with_capacity(paths.len());

    for path in paths {
        let dump = StateDump::open(path)?;
        let analysis = SessionAnalysis::from_dump(&dump, config, &clusterer);
        let extraction = classify(&analysis, config);

        summary.merge(&extraction.summary);
        flag_changes.merge(&dump.flag_changes);
        let runs = extraction
            .inclusions
            .into_iter()
            .map(|inclusion| {
                let run = analysis.runs()[inclusion.index].summary(inclusion.index);
                SelectedRun { inclusion, run }
            })
            .collect();
        files.push(FileSelection { dump: path.clone(), runs });
    }

    log::info!("{} of {} runs selected from {} files", summary.exported_runs, summary.total_runs, paths.len());
    Ok(ExtractReport { summary: summary.rows(), flag_changes, files })
}

fn clips(paths: &[PathBuf], catalog_path: &Path, config: &ExtractConfig, concat: Option<&Path>) -> Result<()> {
    let catalog = RecordingCatalog::load(catalog_path)
        .with_context(|| format!("Failed to load recording catalog: {:?}", catalog_path))?;
    if catalog.is_empty() {
        anyhow::bail!("Recording catalog {:?} lists no recordings", catalog_path);
    }

    let clusterer = DensityClusterer::new(config.cluster.min_cluster_size);
    let mapper = ClipMapper::new(&catalog);
    let mut plan = ClipPlan::default();

    for path in paths {
        let dump = StateDump::open(path)?;
        let analysis = SessionAnalysis::from_dump(&dump, config, &clusterer);
        let extraction = classify(&analysis, config);

        let selected = extraction.indices().map(|i| &analysis.runs()[i]);
        let file_plan = mapper
            .map_runs(selected)
            .with_context(|| format!("Failed to map runs of {:?} onto recordings", path))?;
        plan.segments.extend(file_plan.segments);
        plan.warnings.extend(file_plan.warnings);
    }

    if let Some(out) = concat {
        save_concat_list(&plan, out)?;
    }

    print_json(&ClipsReport {
        clips: &plan.segments,
        warnings: &plan.warnings,
        total_duration: plan.total_duration(),
    })
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to replace it)", path);
    }

    ExtractConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write config: {:?}", path))?;
    println!("Default config written to {}", path.display());
    Ok(())
}
