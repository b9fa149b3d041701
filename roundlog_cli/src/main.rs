//! roundlog CLI
//!
//! Drives the round-windowed coverage pipeline against a mobility source,
//! replays the emitted logs into tabular reports, and hosts the two one-shot
//! preparation tools (unit placement, dataset bundles).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use roundlog_core::{
    analyze_logs, bundles, placement, EmissionPolicy, InlineReportWriter, MobilitySource,
    PipelineConfig, Registry, RoundLogWriter, RoundPipeline, RunSummary,
};
use roundlog_sim::{FleetConfig, FleetSim, TraceSource};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "roundlog")]
#[command(about = "Round-windowed RSU coverage logging and analysis", long_about = None)]
struct Args {
    /// Verbose output (debug-level logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Logs only; handovers reconstructed offline with `analyze`
    Decoupled,
    /// Logs plus live distance/handover CSV reports
    Inline,
}

impl From<PolicyArg> for EmissionPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Decoupled => EmissionPolicy::Decoupled,
            PolicyArg::Inline => EmissionPolicy::Inline,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline against a trace file or the built-in fleet simulator
    Run {
        /// Coverage registry JSON file
        #[arg(long)]
        registry: PathBuf,

        /// Simulated seconds per round
        #[arg(long, default_value = "10.0")]
        round_length: f64,

        /// Output directory for the logs (and inline reports)
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,

        /// Emission policy
        #[arg(long, value_enum, default_value = "decoupled")]
        policy: PolicyArg,

        /// Replay this JSONL trace instead of simulating a fleet
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Fleet seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Fleet size
        #[arg(long, default_value = "20")]
        vehicles: usize,

        /// Fleet duration in simulated seconds
        #[arg(long, default_value = "120.0")]
        duration: f64,

        /// Fleet step length in simulated seconds
        #[arg(long, default_value = "1.0")]
        step: f64,
    },

    /// Rebuild handover counts and summary reports from the two logs
    Analyze {
        /// Membership log (JSONL)
        #[arg(long)]
        membership: PathBuf,

        /// Stats log (JSONL)
        #[arg(long)]
        stats: PathBuf,

        /// Output directory for the CSV reports
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
    },

    /// Pick coverage-unit positions from the density of a trace
    Place {
        /// Trace file to bin (JSONL)
        #[arg(long)]
        trace: PathBuf,

        /// Grid resolution per axis
        #[arg(long, default_value = "100")]
        bins: usize,

        /// Number of units to place
        #[arg(long, default_value = "4")]
        count: usize,

        /// Minimum spacing between units in meters
        #[arg(long, default_value = "200.0")]
        min_dist: f64,

        /// Range radius assigned to every placed unit
        #[arg(long, default_value = "150.0")]
        radius: f64,

        /// Output registry JSON path
        #[arg(long, default_value = "rsus.json")]
        out: PathBuf,
    },

    /// Assign disjoint dataset index bundles to the vehicles of a run
    Bundles {
        /// Membership log (JSONL)
        #[arg(long)]
        membership: PathBuf,

        /// Total dataset size (e.g. 60000 for MNIST train)
        #[arg(long, default_value = "60000")]
        dataset_size: usize,

        /// Indices per vehicle
        #[arg(long, default_value = "200")]
        bundle_size: usize,

        /// Shuffle seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output directory
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match args.command {
        Command::Run {
            registry,
            round_length,
            out_dir,
            policy,
            trace,
            seed,
            vehicles,
            duration,
            step,
        } => {
            let registry = Registry::load(&registry)
                .with_context(|| format!("loading registry {}", registry.display()))?;
            info!(units = registry.len(), "registry loaded");

            let summary = match trace {
                Some(path) => {
                    let mut source = TraceSource::from_file(&path)
                        .with_context(|| format!("loading trace {}", path.display()))?;
                    info!(steps = source.len(), "replaying trace");
                    run_pipeline(&registry, round_length, policy, &out_dir, &mut source)?
                }
                None => {
                    let config = FleetConfig {
                        seed,
                        vehicles,
                        step_s: step,
                        duration_s: duration,
                        ..Default::default()
                    };
                    info!(seed, vehicles, duration, "simulating fleet");
                    let mut source = FleetSim::new(config);
                    run_pipeline(&registry, round_length, policy, &out_dir, &mut source)?
                }
            };

            info!(
                rounds = summary.rounds_flushed,
                batches = summary.batches,
                final_time_s = summary.final_time_s,
                "run complete"
            );
        }

        Command::Analyze { membership, stats, out_dir } => {
            std::fs::create_dir_all(&out_dir)?;
            let summary = analyze_logs(
                &membership,
                &stats,
                out_dir.join("rsu_round_stats.csv"),
                out_dir.join("round_summary.csv"),
            )?;
            info!(
                rounds = summary.rounds,
                handovers = summary.handovers,
                missing_stats_rounds = summary.missing_stats_rounds,
                "analysis complete"
            );
        }

        Command::Place { trace, bins, count, min_dist, radius, out } => {
            let source = TraceSource::from_file(&trace)
                .with_context(|| format!("loading trace {}", trace.display()))?;
            let samples = source.positions();
            info!(samples = samples.len(), "positions collected");

            let grid = match placement::DensityGrid::from_samples(&samples, bins, bins) {
                Some(grid) => grid,
                None => bail!("trace contains no positions to bin"),
            };
            let positions = grid.select_positions(count, min_dist);
            if positions.len() < count {
                info!(
                    placed = positions.len(),
                    requested = count,
                    "fewer hot cells than requested under the spacing constraint"
                );
            }
            for (idx, (x, y)) in positions.iter().enumerate() {
                info!("rsu_{idx}: x={x:.2}, y={y:.2}, radius={radius}");
            }

            let units = placement::to_registry_units(&positions, radius);
            placement::write_registry_file(&out, &units)?;
            info!(path = %out.display(), units = units.len(), "registry written");
        }

        Command::Bundles { membership, dataset_size, bundle_size, seed, out_dir } => {
            let records = roundlog_core::read_membership_log(&membership)?;
            let vehicles = bundles::collect_vehicles(&records);
            info!(rounds = records.len(), vehicles = vehicles.len(), "membership loaded");

            let assigned =
                bundles::assign_disjoint_bundles(&vehicles, dataset_size, bundle_size, seed)?;
            std::fs::create_dir_all(&out_dir)?;
            bundles::write_bundles_file(out_dir.join("vehicle_bundles.json"), &assigned)?;
            bundles::write_round_indices(
                &records,
                &assigned,
                out_dir.join("rsu_round_indices.jsonl"),
                out_dir.join("rsu_round_indices_cumulative.jsonl"),
            )?;
            info!(path = %out_dir.display(), "bundles written");
        }
    }

    Ok(())
}

fn run_pipeline<S: MobilitySource>(
    registry: &Registry,
    round_length: f64,
    policy: PolicyArg,
    out_dir: &Path,
    source: &mut S,
) -> anyhow::Result<RunSummary> {
    std::fs::create_dir_all(out_dir)?;
    let writer = RoundLogWriter::create(
        out_dir.join("round_membership.jsonl"),
        out_dir.join("round_stats.jsonl"),
    )?;

    let config = PipelineConfig {
        round_length,
        policy: policy.into(),
    };
    let mut pipeline = RoundPipeline::new(registry, config, writer);
    if matches!(policy, PolicyArg::Inline) {
        let reports = InlineReportWriter::create(
            out_dir.join("rsu_round_stats.csv"),
            out_dir.join("round_summary.csv"),
        )?;
        pipeline = pipeline.with_inline_reports(reports);
    }

    Ok(pipeline.run(source)?)
}
