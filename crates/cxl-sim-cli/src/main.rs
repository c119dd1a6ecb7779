//! Trace-driven reference front-end for the CXL interconnect simulator.

mod driver;
mod trace;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use cxl_sim::{CxlSim, SimConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cxl-sim", about = "Cycle-driven CXL Type-3 interconnect simulator")]
struct Args {
    /// JSON configuration file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trace file, one request per line: `<addr> <type> [<cycle>]`.
    #[arg(long)]
    trace: PathBuf,

    /// Statistics output directory (overrides the config).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Abort if the trace has not drained by this cycle.
    #[arg(long)]
    max_cycles: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(out) = args.out {
        config.stats_out_dir = out;
    }

    let entries = trace::load_trace(&args.trace)?;
    let total = entries.len();

    config
        .write_applied(&config.stats_out_dir)
        .context("recording applied configuration")?;
    let mut sim = CxlSim::new(config).context("initializing the simulator")?;
    let mut driver = driver::TraceDriver::new(entries);
    driver.register_callbacks(&mut sim);

    let cycles = driver.run(&mut sim, args.max_cycles)?;
    let stats_path = sim.finalize().context("writing statistics")?;

    let report = sim.report();
    println!("{total} requests completed in {cycles} cycles");
    println!(
        "goodput {:.3}, avg phys latency {:.2}, cache hit rate {:.3}",
        report.pcie_goodput_ratio, report.avg_pcie_phys_latency, report.ndp_cache_hit_rate
    );
    println!("statistics written to {}", stats_path.display());
    Ok(())
}
