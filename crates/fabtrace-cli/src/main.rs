//! Fabtrace CLI
//!
//! Runs one coverage-guided sampling pass over a fab's utility network:
//! catalog snapshot in, network snapshot in, persisted run artifacts and a
//! console summary out.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use fabtrace_catalog::CatalogSnapshot;
use fabtrace_core::{CoverageLedger, RunConfig, RunLoop, RunReport, RunStatus};
use fabtrace_network::{NetworkGraph, NetworkPathFinder};
use fabtrace_storage::RunStore;

#[derive(Parser)]
#[command(name = "fabtrace")]
#[command(author, version, about = "Utility-network path coverage sampler")]
struct Cli {
    /// Fab identifier (e.g. M16, M15)
    #[arg(long)]
    fab: String,

    /// Catalog snapshot JSON (toolsets/equipment/PoCs)
    #[arg(long)]
    catalog: PathBuf,

    /// Network snapshot JSON (nodes/links)
    #[arg(long)]
    network: PathBuf,

    /// Coverage target as a fraction of nodes+links
    #[arg(long, default_value_t = 0.2)]
    coverage_target: f64,

    /// Restrict sampling to one toolset code ("ALL" samples every toolset)
    #[arg(long)]
    toolset: Option<String>,

    /// Run tag for identification
    #[arg(long, default_value = "default")]
    tag: String,

    /// Hard cap on loop iterations
    #[arg(long, default_value_t = 10_000)]
    max_iterations: u32,

    /// Fixed RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for persisted run artifacts
    #[arg(long, default_value = "runs")]
    out: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(&cli) {
        Ok(report) => {
            print_summary(&report, cli.coverage_target, cli.verbose);
            if report.status == RunStatus::Completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<RunReport> {
    if !(cli.coverage_target > 0.0 && cli.coverage_target <= 1.0) {
        bail!("coverage target must be within (0.0, 1.0]");
    }

    let catalog = CatalogSnapshot::from_json_file(&cli.catalog)
        .with_context(|| format!("loading catalog snapshot {}", cli.catalog.display()))?;
    if catalog.fab() != cli.fab {
        bail!(
            "catalog snapshot is for fab {}, requested {}",
            catalog.fab(),
            cli.fab
        );
    }

    let graph = NetworkGraph::from_json_file(&cli.network)
        .with_context(|| format!("loading network snapshot {}", cli.network.display()))?;
    let ledger = CoverageLedger::new(graph.total_nodes(), graph.total_links());
    let oracle = NetworkPathFinder::new(graph);

    let mut config = RunConfig::new(&cli.fab);
    config.toolset = cli.toolset.clone();
    config.tag = cli.tag.clone();
    config.coverage_target = cli.coverage_target;
    config.max_iterations = cli.max_iterations;
    config.seed = cli.seed;

    tracing::info!(run_id = %config.run_id, fab = %cli.fab, "starting run");
    let report = RunLoop::new(config, &catalog, oracle, ledger).execute();

    let store = RunStore::open(&cli.out).context("opening run store")?;
    store
        .persist_run(&report, cli.coverage_target)
        .context("persisting run artifacts")?;

    Ok(report)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_summary(report: &RunReport, target: f64, verbose: bool) {
    let status = match report.status {
        RunStatus::Completed => "COMPLETED".green().bold(),
        RunStatus::Partial => "PARTIAL".yellow().bold(),
        _ => "FAILED".red().bold(),
    };

    println!();
    println!("{}", "=".repeat(60));
    println!("{}", "RUN SUMMARY".bold());
    println!("{}", "=".repeat(60));
    println!("Run ID:   {}", report.run_id);
    println!("Fab:      {}", report.fab);
    println!("Tag:      {}", report.tag);
    println!("Status:   {status} ({})", report.reason);
    println!("Duration: {:.2}s", report.duration_secs());
    println!();
    println!("Target Coverage:   {:.1}%", target * 100.0);
    println!(
        "Achieved Coverage: {:.1}%",
        report.coverage.percentage * 100.0
    );
    println!(
        "Paths: {} found / {} attempted ({} unique)",
        report.paths_found,
        report.paths_attempted,
        report.unique_paths()
    );
    println!(
        "Graph: {} nodes, {} links",
        report.coverage.total_nodes, report.coverage.total_links
    );

    if !report.review_flags.is_empty() {
        println!();
        println!("{} ({})", "REVIEW FLAGS".yellow(), report.review_flags.len());
        let shown = if verbose { report.review_flags.len() } else { 5 };
        for flag in report.review_flags.iter().take(shown) {
            println!(
                "  - {} {} -> {}: {}",
                flag.toolset, flag.start_node, flag.end_node, flag.reason
            );
        }
        if report.review_flags.len() > shown {
            println!("  ... and {} more", report.review_flags.len() - shown);
        }
    }
}
