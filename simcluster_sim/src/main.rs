//! simcluster Simulator CLI
//!
//! Run cluster bring-up scenarios against a simulated cluster.

use anyhow::Context;
use clap::Parser;
use simcluster_core::ClusterConfig;
use simcluster_sim::scenarios::ScenarioId;
use simcluster_sim::{ScenarioResult, ScenarioRunner};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "simcluster-sim")]
#[command(about = "Run deterministic cluster bring-up scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of simulated clients
    #[arg(short, long, default_value = "3", value_parser = clap::value_parser!(u64).range(1..))]
    clients: u64,

    /// Scenario to run (happy_path, load_failure, drop_during_load, ..., all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Tick budget per phase
    #[arg(long, default_value = "200")]
    max_ticks: u64,

    /// Cluster config (JSON) to run against instead of generated addresses
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        let scenario = args
            .scenario
            .parse::<ScenarioId>()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("available scenarios: happy_path, load_failure, drop_during_load, drop_while_running, stop_while_running, duplicate_info, version_mismatch, refused_connect, all")?;
        vec![scenario]
    };

    let cluster = match &args.config {
        Some(path) => {
            let cluster = ClusterConfig::from_file(path).with_context(|| format!("loading cluster config {}", path))?;
            info!(path = %path, clients = cluster.network.cluster_addresses.len(), "Loaded cluster config");
            Some(cluster)
        }
        None => None,
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .context("system clock before epoch")?
            .as_nanos() as u64
    } else {
        args.seed
    };

    if !args.json {
        info!("simcluster simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let mut runner = ScenarioRunner::new(seed, args.clients as usize).with_max_ticks(args.max_ticks);
        if let Some(cluster) = &cluster {
            runner = runner.with_cluster(cluster.clone());
        }

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED in {} ticks", scenario.name(), seed, result.total_ticks);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "final_state": r.final_state.to_string(),
                    "failure_reason": r.failure_reason,
                    "metrics": {
                        "load_broadcasts": r.metrics.load_broadcasts,
                        "run_broadcasts": r.metrics.run_broadcasts,
                        "stop_broadcasts": r.metrics.stop_broadcasts,
                        "teardowns": r.metrics.teardowns,
                        "dropped_messages": r.metrics.dropped_messages,
                    },
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if failed_count == 0 {
        info!("All {} scenario runs passed", total);
    } else {
        error!("{}/{} scenario runs failed", failed_count, total);
        for result in all_results.iter().filter(|r| !r.passed) {
            error!(
                "  - {} seed={}: {}",
                result.scenario.name(),
                result.seed,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}
