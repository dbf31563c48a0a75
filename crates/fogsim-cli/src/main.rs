//! Fogsim CLI
//!
//! Command-line interface for running fog offloading simulations and
//! comparing the Static, Dynamic and Hybrid policies on one topology.
//!
//! Binary: fogsim

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fogsim_core::FogError;
use fogsim_engine::export;
use fogsim_engine::{
    DynamicPolicy, HybridPolicy, OffloadPolicy, PolicyReport, Seeds, SimConfig, Simulation,
    StaticPolicy,
};

/// Fogsim - IoT-to-fog offloading policy benchmark
#[derive(Parser)]
#[command(name = "fogsim")]
#[command(about = "Simulate IoT-to-fog task offloading policies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation and report per-policy metrics
    Run {
        /// Policies to compare: static, dynamic, hybrid, all, or a
        /// comma-separated list
        #[arg(long, default_value = "all")]
        policy: String,

        /// Number of fog devices
        #[arg(long, default_value_t = 10)]
        fog: usize,

        /// Number of IoT devices
        #[arg(long, default_value_t = 20)]
        iot: usize,

        /// Number of spatial cells
        #[arg(long, default_value_t = 2)]
        cells: usize,

        /// Simulation length in ticks
        #[arg(long, default_value_t = 60)]
        ticks: u64,

        /// Base seed; rebases every random stream (default: reference seeds)
        #[arg(long)]
        seed: Option<u64>,

        /// Per-IoT-device task generation probability per tick
        #[arg(long, default_value_t = 0.2)]
        gen_probability: f64,

        /// Admission queue capacity per fog device
        #[arg(long, default_value_t = 100)]
        max_queue: usize,

        /// Write the summary CSV to this path; a directory gets a
        /// timestamped file name
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write full reports (device breakdown included) as JSON; a
        /// directory gets a timestamped file name
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Compare all policies across a grid of fleet configurations
    Sweep {
        /// Simulation length in ticks for every configuration
        #[arg(long, default_value_t = 300)]
        ticks: u64,

        /// Base seed; rebases every random stream (default: reference seeds)
        #[arg(long)]
        seed: Option<u64>,

        /// Write one summary CSV row per policy and configuration; a
        /// directory gets a timestamped file name
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

/// Resolve an output argument: files are used as given, directories get a
/// timestamped file inside them
fn output_path(path: PathBuf, prefix: &str, extension: &str) -> PathBuf {
    if path.is_dir() {
        path.join(export::timestamped_name(prefix, extension))
    } else {
        path
    }
}

/// Fleet shapes exercised by the sweep
const SWEEP_FOG_COUNTS: [usize; 3] = [10, 19, 30];
const SWEEP_CELL_COUNTS: [usize; 3] = [2, 4, 6];
const SWEEP_IOT_COUNTS: [usize; 3] = [30, 50, 100];

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fogsim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ FogError::Config(_)) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> fogsim_core::Result<()> {
    match cli.command {
        Commands::Run {
            policy,
            fog,
            iot,
            cells,
            ticks,
            seed,
            gen_probability,
            max_queue,
            csv,
            json,
        } => {
            let config = SimConfig {
                fog_count: fog,
                iot_count: iot,
                cells,
                ticks,
                gen_probability,
                max_queue,
                seeds: seed.map(Seeds::from_base).unwrap_or_default(),
                ..Default::default()
            };

            println!("Fogsim offloading benchmark");
            println!("  Fog devices: {fog}");
            println!("  IoT devices: {iot}");
            println!("  Cells:       {cells}");
            println!("  Ticks:       {ticks}");
            println!();

            let mut simulation = Simulation::new(config)?;
            let mut reports = Vec::new();

            for name in parse_policies(&policy)? {
                let policy = make_policy(name, simulation.config().seeds.policy)?;
                print!("Running {name} policy... ");
                let report = simulation.run(policy)?;
                println!("done");
                reports.push(report);
            }

            println!();
            print_table(&reports);

            if let Some(path) = csv {
                let path = output_path(path, "results", "csv");
                export::write_summary_csv(&path, &reports)?;
                for report in &reports {
                    let device_path =
                        path.with_file_name(format!("{}_devices.csv", report.policy));
                    export::write_device_csv(&device_path, report)?;
                }
                println!("\nSummary CSV written to {}", path.display());
            }
            if let Some(path) = json {
                let path = output_path(path, "results", "json");
                export::write_json(&path, &reports)?;
                println!("JSON report written to {}", path.display());
            }

            Ok(())
        }
        Commands::Sweep { ticks, seed, csv } => run_sweep(ticks, seed, csv),
    }
}

fn run_sweep(ticks: u64, seed: Option<u64>, csv: Option<PathBuf>) -> fogsim_core::Result<()> {
    let seeds = seed.map(Seeds::from_base).unwrap_or_default();
    let mut all_reports = Vec::new();

    println!("Fogsim policy sweep ({ticks} ticks per run)\n");

    for fog in SWEEP_FOG_COUNTS {
        for cells in SWEEP_CELL_COUNTS {
            // skip shapes without enough devices per cell
            if cells as f64 > fog as f64 / 3.0 {
                continue;
            }
            for iot in SWEEP_IOT_COUNTS {
                let config = SimConfig {
                    fog_count: fog,
                    iot_count: iot,
                    cells,
                    ticks,
                    seeds,
                    ..Default::default()
                };
                let mut simulation = Simulation::new(config)?;

                let mut batch = Vec::new();
                for name in ["static", "dynamic", "hybrid"] {
                    let policy = make_policy(name, seeds.policy)?;
                    batch.push(simulation.run(policy)?);
                }
                print_comparison(&batch);
                all_reports.extend(batch);
            }
        }
    }

    print_policy_averages(&all_reports);

    if let Some(path) = csv {
        let path = output_path(path, "sweep", "csv");
        export::write_summary_csv(&path, &all_reports)?;
        println!("\nSweep CSV written to {}", path.display());
    }
    Ok(())
}

/// Relative change of the hybrid policy against a baseline, in percent
fn improvement(hybrid: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (hybrid / baseline - 1.0) * 100.0
    }
}

fn print_comparison(batch: &[PolicyReport]) {
    let hybrid = batch.iter().find(|r| r.policy == "hybrid");
    let (Some(hybrid), Some(first)) = (hybrid, batch.first()) else {
        return;
    };

    println!("[{}]", first.config);
    for baseline in batch.iter().filter(|r| r.policy != "hybrid") {
        println!(
            "  hybrid vs {:<8} utilization {:+6.1}%  balance {:+6.1}%  completion {:+6.1}%",
            baseline.policy,
            improvement(hybrid.utilization, baseline.utilization),
            improvement(hybrid.load_balance_stddev, baseline.load_balance_stddev),
            improvement(hybrid.completion_rate, baseline.completion_rate),
        );
    }
}

fn print_policy_averages(reports: &[PolicyReport]) {
    println!("\nAverages over all configurations:");
    for name in ["static", "dynamic", "hybrid"] {
        let runs: Vec<&PolicyReport> = reports.iter().filter(|r| r.policy == name).collect();
        if runs.is_empty() {
            continue;
        }
        let n = runs.len() as f64;
        let avg = |f: fn(&PolicyReport) -> f64| runs.iter().map(|r| f(r)).sum::<f64>() / n;
        println!(
            "  {:<8} completion {:>5.1}%  utilization {:>5.1}%  balance {:>5.1}%  offload {:>5.1}%",
            name,
            avg(|r| r.completion_rate) * 100.0,
            avg(|r| r.utilization) * 100.0,
            avg(|r| r.load_balance_stddev) * 100.0,
            avg(|r| r.offload_rate) * 100.0,
        );
    }
}

fn parse_policies(arg: &str) -> fogsim_core::Result<Vec<&str>> {
    if arg == "all" {
        return Ok(vec!["static", "dynamic", "hybrid"]);
    }
    let names: Vec<&str> = arg.split(',').map(str::trim).collect();
    for name in &names {
        if !matches!(*name, "static" | "dynamic" | "hybrid") {
            return Err(FogError::config(format!("unknown policy: {name}")));
        }
    }
    Ok(names)
}

fn make_policy(name: &str, seed: u64) -> fogsim_core::Result<Box<dyn OffloadPolicy>> {
    match name {
        "static" => Ok(Box::new(StaticPolicy::new())),
        "dynamic" => Ok(Box::new(DynamicPolicy::new(seed))),
        "hybrid" => Ok(Box::new(HybridPolicy::new())),
        other => Err(FogError::config(format!("unknown policy: {other}"))),
    }
}

fn print_table(reports: &[PolicyReport]) {
    println!(
        "{:<10} {:>10} {:>10} {:>8} {:>8} {:>12} {:>12} {:>10} {:>10}",
        "Policy", "Completed", "Dropped", "Util", "Balance", "Avg Resp ms", "Energy J", "Offload", "Messages"
    );
    println!("{}", "-".repeat(98));

    for r in reports {
        println!(
            "{:<10} {:>6}/{:<3} {:>10} {:>7.1}% {:>7.1}% {:>12.2} {:>12.1} {:>9.1}% {:>10}",
            r.policy,
            r.completed,
            r.generated,
            r.dropped,
            r.utilization * 100.0,
            r.load_balance_stddev * 100.0,
            r.avg_response_ms,
            r.total_energy_j,
            r.offload_rate * 100.0,
            r.messages,
        );
    }

    // spread-based balance alongside, so both formulas are visible
    println!();
    for r in reports {
        println!(
            "{:<10} load balance: stddev {:.1}%, spread {:.1}%  energy/task: {:.2} J  ({} failed, {} flushed in flight)",
            r.policy,
            r.load_balance_stddev * 100.0,
            r.load_balance_spread * 100.0,
            r.energy_per_task_j,
            r.failed,
            r.still_in_flight,
        );
    }
}
