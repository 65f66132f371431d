use std::process::exit;
use std::time::Instant;

use clap::Parser;
use log::error;

use bladesim::config::SimulationConfig;
use bladesim::simulation::ClusterSimulation;

fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to a simulation config in YAML format.
    #[clap(short, long)]
    config: String,

    /// Path to write per-cycle statistics as CSV.
    #[clap(long)]
    report: Option<String>,

    /// Path to write SLA violations as CSV.
    #[clap(long)]
    violations: Option<String>,
}

fn main() {
    init_logger();

    let args = Args::parse();
    let config = match SimulationConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            exit(1);
        }
    };
    let mut sim = match ClusterSimulation::from_config(&config) {
        Ok(sim) => sim,
        Err(e) => {
            error!("{}", e);
            exit(1);
        }
    };

    let simulation_start = Instant::now();
    sim.run();
    let elapsed = simulation_start.elapsed();

    let summary = sim.summary();
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Can't serialize summary: {}", e),
    }

    if let Some(path) = args.report {
        if let Err(e) = sim.save_cycle_stats(&path) {
            error!("Can't write report {}: {}", path, e);
        }
    }
    if let Some(path) = args.violations {
        if let Err(e) = sim.violations().save_log(&path) {
            error!("Can't write violations {}: {}", path, e);
        }
    }

    println!("Simulation process time {:.2?}", elapsed);
}
