use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::config::{NodeCacheMode, RuntimeConfig, Settings};
use crate::geometry::TagCleanFilter;
use crate::reader::{for_each_element, index_locations};
use crate::regulatory::source::{RegulatoryData, load_data_dir};
use crate::rewriter::{RunReport, Rewriter};
use crate::sinks::{ElementSink, OsmXmlSink};
use crate::storage::{LocationIndex, LocationIndexWriter};
use crate::utils::ProgressCounter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input OSM file (.osm.pbf or .osm)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory for nodes.osm, ways.osm and relations.osm
    #[arg(short, long)]
    pub output: PathBuf,

    /// Directory holding the regulatory layer files (GeoJSON)
    #[arg(short, long)]
    pub data: PathBuf,

    /// Run settings (YAML)
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Force specific node cache mode
    #[arg(long, value_enum)]
    pub node_cache_mode: Option<NodeCacheMode>,

    /// Write the run summary as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Number of threads (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn resolve_node_cache_mode(
    requested: NodeCacheMode,
    input_path: &Path,
    runtime: &RuntimeConfig,
) -> (NodeCacheMode, String) {
    match requested {
        NodeCacheMode::Auto => {
            let file_size = std::fs::metadata(input_path).map(|m| m.len()).unwrap_or(0);
            let size_gb = file_size as f64 / (1024.0 * 1024.0 * 1024.0);

            if file_size >= runtime.sparse_threshold_bytes {
                (
                    NodeCacheMode::Sparse,
                    format!("sparse (auto-selected for {:.1} GB input)", size_gb),
                )
            } else {
                (
                    NodeCacheMode::Memory,
                    format!("memory (auto-selected for {:.1} GB input)", size_gb),
                )
            }
        }
        requested => (requested, requested.label().to_string()),
    }
}

/// Pass 1: node locations for way geometries.
pub fn build_location_index(input: &Path, runtime: &RuntimeConfig) -> Result<LocationIndex> {
    let (resolved_mode, mode_desc) =
        resolve_node_cache_mode(runtime.node_cache_mode, input, runtime);

    let writer = match resolved_mode {
        NodeCacheMode::Memory => {
            tracing::info!("Node cache: {}", mode_desc);
            LocationIndexWriter::new_memory()
        }
        _ => {
            tracing::info!("Node cache: {} (temp file)", mode_desc);
            LocationIndexWriter::new_sparse()
                .context("Pipeline: Failed to create sparse node cache")?
        }
    };

    let pass1_mode = if writer.requires_sorted_input() {
        "sequential"
    } else {
        "parallel"
    };
    tracing::info!("Pass 1: Indexing nodes from {:?} ({})...", input, pass1_mode);
    let (writer, node_count) = index_locations(input, writer)?;
    tracing::info!("Indexed {} nodes.", node_count);

    let index = writer.finalize()?;
    tracing::info!("Node cache ready.");
    Ok(index)
}

/// Pass 2: stream every element through the rewriter into `sink`.
pub fn rewrite(
    input: &Path,
    data: &RegulatoryData,
    locations: Option<&LocationIndex>,
    clean: Option<&TagCleanFilter>,
    settings: &Settings,
    sink: &mut dyn ElementSink,
) -> Result<RunReport> {
    let ids = settings.id_allocator()?;
    let mut rewriter = Rewriter::new(data, locations, clean, ids, sink);
    let progress = ProgressCounter::new("Pass 2/2: rewriting elements", 100_000);
    for_each_element(input, |element| {
        progress.inc(1);
        rewriter.process(element)
    })?;
    progress.finish();
    rewriter.finish()
}

pub fn run(cli: &Cli) -> Result<RunReport> {
    let settings = Settings::load(cli.settings.as_deref())
        .context("CLI: Failed to load settings")?;
    let settings_dir = cli
        .settings
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));
    let clean = settings.clean_filter(settings_dir)?;

    let data = load_data_dir(&cli.data)?;
    tracing::info!(
        "Layers: restrictions {}, road speeds {}, preferred roads {}, low emission zones {}",
        data.restrictions.is_some(),
        data.road_speeds.is_some(),
        data.preferred_roads.is_some(),
        data.low_emission_zones.is_some()
    );

    let runtime = RuntimeConfig {
        node_cache_mode: cli.node_cache_mode.unwrap_or(NodeCacheMode::Auto),
        ..RuntimeConfig::default()
    };

    let needs_locations = data.has_segment_layers() || clean.is_some();
    tracing::info!("Node cache required: {}", needs_locations);
    let locations = if needs_locations {
        Some(build_location_index(&cli.input, &runtime)?)
    } else {
        None
    };

    let mut sink = OsmXmlSink::create(&cli.output)?;
    tracing::info!("Pass 2: Rewriting elements from {:?}...", cli.input);
    let report = rewrite(
        &cli.input,
        &data,
        locations.as_ref(),
        clean.as_ref(),
        &settings,
        &mut sink,
    )?;
    sink.finish().context("Pipeline: Failed to finalize sink")?;

    report.log_summary();
    if let Some(path) = &cli.report {
        report.write_json(path)?;
        tracing::info!("Report written to {:?}", path);
    }
    Ok(report)
}
