use std::io::Write;
use std::time::Instant;

use clap::Parser;
use env_logger::Builder;
use log::info;

use dslab_xfabric::config::SimulationConfig;
use dslab_xfabric::experiment::FabricSimulation;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
/// Runs static traffic over a dumbbell fabric with weighted rate allocation
struct Args {
    /// Path to simulation config
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Override random seed from config
    #[arg(long)]
    seed: Option<u64>,

    /// Save full report in JSON format to this file
    #[arg(short, long)]
    output: Option<String>,
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let mut config = SimulationConfig::from_file(&args.config);
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let mut fabric = match FabricSimulation::new(config) {
        Ok(fabric) => fabric,
        Err(e) => {
            eprintln!("Failed to build simulation: {}", e);
            std::process::exit(1);
        }
    };

    // -----------------------------------------------------------------------------------------------------------------

    let t = Instant::now();
    let flows = fabric.generate_flows();
    let report = fabric.run();
    let elapsed = t.elapsed().as_secs_f64();

    // -----------------------------------------------------------------------------------------------------------------

    info!("");
    info!("Flows generated: {}", flows);
    info!("Flows completed: {}", report.flows_completed);
    info!(
        "Known flows: {} (mean FCT {:.6} s, max FCT {:.6} s)",
        report.known.flows, report.known.mean, report.known.max
    );
    info!(
        "Unknown flows: {} (mean FCT {:.6} s, max FCT {:.6} s)",
        report.unknown.flows, report.unknown.mean, report.unknown.max
    );
    info!(
        "Bottleneck {}: {} packets dropped, {} marked, peak occupancy {} bytes",
        report.bottleneck, report.queue.dropped_packets, report.queue.marked_packets, report.peak_queue_bytes
    );
    info!("Transmitted bytes: {}", report.transmitted_bytes);
    info!(
        "Processed {} events in {:.2}s ({:.0} events/s), simulated time {:.6}",
        report.event_count,
        elapsed,
        report.event_count as f64 / elapsed,
        report.finish_time
    );

    if let Some(path) = args.output {
        let json = serde_json::to_string_pretty(&report.to_json()).unwrap();
        std::fs::write(&path, json).unwrap_or_else(|e| panic!("Can't write report to {}: {}", path, e));
        info!("Report saved to {}", path);
    }
}
