//! Reshard CLI - resharding simulator
//!
//! This binary expands a generated table from `O` to `N` segments, running
//! one independent reshuffle pipeline per segment, and reports how rows moved.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use reshard_common::{Config, Datum, DistributionPolicy, ReshuffleConfig, Row, SegmentId};
use reshard_executor::{ExplicitMotion, SegmentReport, TableLayout, reshuffle_segment};
use reshard_placement::{ClusterTopology, DestinationList};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "reshard-cli")]
#[command(about = "Reshard resharding simulator")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "reshard.toml")]
    config: String,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Expand a generated table and report row movement
    Simulate {
        /// Segment count before expansion
        #[arg(long)]
        old: Option<u32>,
        /// Segment count after expansion
        #[arg(long)]
        new: Option<u32>,
        /// Distribution policy of the table
        #[arg(long, value_enum, default_value_t = PolicyArg::Hash)]
        policy: PolicyArg,
        /// Hash key columns (zero-based)
        #[arg(long, value_delimiter = ',', default_value = "0")]
        key_columns: Vec<usize>,
        /// Number of rows to generate
        #[arg(long, default_value_t = 10_000)]
        rows: i64,
        /// Random seed for placement and routing
        #[arg(long)]
        seed: Option<u64>,
        /// Verify every delete against the old hash
        #[arg(long)]
        verify_deletes: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which new segments each old segment seeds for replicated tables
    Destinations {
        /// Segment count before expansion
        #[arg(long)]
        old: Option<u32>,
        /// Segment count after expansion
        #[arg(long)]
        new: Option<u32>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Hash,
    Random,
    Replicated,
}

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(flatten)]
    reshard: Config,
    #[serde(default)]
    logging: LoggingConfig,
}

impl FileConfig {
    /// Apply command line overrides and build the validated topology
    fn topology(&mut self, old: Option<u32>, new: Option<u32>) -> Result<ClusterTopology> {
        if let Some(old) = old {
            self.reshard.reshuffle.old_segments = old;
        }
        if let Some(new) = new {
            self.reshard.cluster.segment_count = new;
        }
        ClusterTopology::from_config(&self.reshard).context("invalid cluster configuration")
    }
}

#[derive(Debug, Deserialize)]
struct LoggingConfig {
    #[serde(default = "default_log_level")]
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    policy: String,
    old_segments: u32,
    new_segments: u32,
    rows: i64,
    rows_before: Vec<usize>,
    rows_after: Vec<usize>,
    shipped: u64,
    segments: Vec<SegmentReport>,
}

fn load_config(path: &str) -> Result<FileConfig> {
    if !Path::new(path).exists() {
        return Ok(FileConfig::default());
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    toml::from_str(&raw).with_context(|| format!("parsing {path}"))
}

fn generate_rows(count: i64) -> Vec<Row> {
    (0..count)
        .map(|i| {
            vec![
                Datum::Int(i),
                Datum::Text(format!("row-{i}")),
                Datum::Int(i % 97),
            ]
        })
        .collect()
}

fn build_policy(policy: PolicyArg, key_columns: Vec<usize>) -> DistributionPolicy {
    match policy {
        PolicyArg::Hash => DistributionPolicy::Hash { key_columns },
        PolicyArg::Random => DistributionPolicy::Random,
        PolicyArg::Replicated => DistributionPolicy::Replicated,
    }
}

async fn simulate(
    cluster: ClusterTopology,
    policy: DistributionPolicy,
    config: ReshuffleConfig,
    rows: i64,
) -> Result<SimulationReport> {
    let mut layout = TableLayout::distribute(
        generate_rows(rows),
        &policy,
        cluster.old_segments(),
        config.random_seed,
    )?;
    let rows_before = layout.row_counts();

    // One blocking task per segment, as each segment runs on its own
    let mut handles = Vec::new();
    for segment in cluster.segments() {
        let topology = cluster.for_segment(segment)?;
        let stored = layout.rows(segment).to_vec();
        let policy = policy.clone();
        let config = config.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            reshuffle_segment(stored, topology, &policy, &config)
        }));
    }

    let mut motion = ExplicitMotion::new(cluster.new_segments());
    let mut segments = Vec::with_capacity(handles.len());
    for handle in handles {
        let (report, outboxes) = handle.await.context("segment task panicked")??;
        info!(
            segment = %report.segment,
            scanned = report.scanned,
            selected = report.selected,
            shipped = report.shipped,
            "segment finished"
        );
        motion.merge(outboxes)?;
        segments.push(report);
    }

    layout.apply(&motion)?;

    Ok(SimulationReport {
        policy: policy.to_string(),
        old_segments: cluster.old_segments(),
        new_segments: cluster.new_segments(),
        rows,
        rows_before,
        rows_after: layout.row_counts(),
        shipped: segments.iter().map(|r| r.shipped).sum(),
        segments,
    })
}

fn print_report(report: &SimulationReport) {
    println!(
        "Reshuffle {} table: {} -> {} segments, {} rows",
        report.policy, report.old_segments, report.new_segments, report.rows
    );
    println!("{}", "=".repeat(72));
    println!(
        "{:<8} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "SEGMENT", "BEFORE", "AFTER", "SCANNED", "SELECTED", "SHIPPED"
    );
    println!("{}", "-".repeat(72));
    for seg in &report.segments {
        let index = seg.segment.as_usize();
        println!(
            "{:<8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            seg.segment.get(),
            report.rows_before.get(index).copied().unwrap_or(0),
            report.rows_after.get(index).copied().unwrap_or(0),
            seg.scanned,
            seg.selected,
            seg.shipped
        );
    }
    println!("{}", "-".repeat(72));
    println!("Rows shipped: {}", report.shipped);
}

fn print_destinations(cluster: &ClusterTopology) -> Result<()> {
    println!(
        "Replicated fan-out: {} -> {} segments",
        cluster.old_segments(),
        cluster.new_segments()
    );
    println!("{}", "=".repeat(40));
    for segment in (0..cluster.old_segments()).map(SegmentId::new) {
        let destinations = DestinationList::compute(&cluster.for_segment(segment)?);
        let list: Vec<String> = destinations
            .as_slice()
            .iter()
            .map(ToString::to_string)
            .collect();
        if list.is_empty() {
            println!("seg{:<4} -> (none)", segment.get());
        } else {
            println!("seg{:<4} -> {}", segment.get(), list.join(", "));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file if it exists
    let mut file = load_config(&args.config)?;
    let log_level = args.log_level.unwrap_or_else(|| file.logging.level.clone());

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Commands::Simulate {
            old,
            new,
            policy,
            key_columns,
            rows,
            seed,
            verify_deletes,
            json,
        } => {
            if rows < 0 {
                bail!("row count must not be negative");
            }
            let cluster = file.topology(old, new)?;
            let mut config = file.reshard.reshuffle;
            if seed.is_some() {
                config.random_seed = seed;
            }
            config.verify_deletes |= verify_deletes;
            if config.random_seed.is_none() {
                warn!("no random seed configured, results will not be reproducible");
            }

            let policy = build_policy(policy, key_columns);
            policy.validate()?;

            let report = simulate(cluster, policy, config, rows).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Destinations { old, new } => {
            let cluster = file.topology(old, new)?;
            print_destinations(&cluster)?;
        }
    }

    Ok(())
}
