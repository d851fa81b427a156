//! Thread node simulation binary.
//!
//! Runs several MLE interfaces in one process over a simulated broadcast
//! radio and logs the topology they settle into.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;
mod sim;

use config::{RunConfig, SimulationConfig};
use logging::ThreadLogFormatter;
use sim::Simulation;

/// In-process Thread mesh simulation
#[derive(Parser, Debug)]
#[command(name = "thread-node", version, about = "In-process Thread mesh simulation")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "thread.yaml")]
    config: PathBuf,

    /// Number of generated nodes (ignored when the config lists nodes)
    #[arg(long)]
    nodes: Option<usize>,

    /// Simulated time per step, e.g. 50ms
    #[arg(long)]
    tick: Option<humantime::Duration>,

    /// Total simulated time, e.g. 5m
    #[arg(long)]
    duration: Option<humantime::Duration>,

    /// Seed of the radio and the node random sources
    #[arg(long)]
    seed: Option<u64>,

    /// Frame loss probability
    #[arg(long)]
    loss: Option<f64>,

    /// Pace the simulation against the wall clock
    #[arg(long)]
    realtime: bool,

    /// Write the final topology as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(nodes) = self.nodes {
            config.simulation.node_count = nodes;
        }
        if let Some(tick) = &self.tick {
            config.simulation.tick = **tick;
        }
        if let Some(duration) = &self.duration {
            config.simulation.duration = **duration;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if let Some(loss) = self.loss {
            config.radio.loss = loss;
        }
        if self.realtime {
            config.simulation.realtime = true;
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("thread_node={}", args.log_level).parse()?)
        .add_directive(format!("thread_mle={}", args.log_level).parse()?)
        .add_directive(format!("thread_topology={}", args.log_level).parse()?)
        .add_directive(format!("thread_wire={}", args.log_level).parse()?);

    let formatter = ThreadLogFormatter::new("thread".to_string(), logging::is_terminal());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .event_format(formatter)
        .init();

    info!("Starting Thread node simulation v{}", env!("CARGO_PKG_VERSION"));

    let mut config = SimulationConfig::load_from_file(&args.config)?;
    args.apply(&mut config);
    info!(
        "Simulation config: tick={:?}, duration={:?}, seed={}, realtime={}",
        config.simulation.tick,
        config.simulation.duration,
        config.simulation.seed,
        config.simulation.realtime
    );

    let mut sim = Simulation::new(&config)?;

    tokio::select! {
        _ = run(&mut sim, &config.simulation) => {
            info!("Simulation finished at {} ms", sim.now_ms());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT signal, stopping at {} ms", sim.now_ms());
        }
    }

    log_topology(&sim);
    if let Some(path) = &args.report {
        write_report(&sim, path)?;
        info!("Topology report written to {:?}", path);
    }
    Ok(())
}

fn write_report(sim: &Simulation, path: &std::path::Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&sim.topology())?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Step the simulation until its duration has elapsed
async fn run(sim: &mut Simulation, run: &RunConfig) {
    let end_ms = sim.now_ms() + run.duration.as_millis() as u64;
    let mut interval = tokio::time::interval(run.tick.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    while sim.now_ms() < end_ms {
        if run.realtime {
            interval.tick().await;
        } else {
            tokio::task::yield_now().await;
        }
        sim.step();
    }
}

fn log_topology(sim: &Simulation) {
    let report = sim.report();
    for (index, node) in report.iter().enumerate() {
        component_info!(
            "topology",
            "{} {} rloc16={:#06x} partition={} parent={} children={} routers={} devices={} channel={} pan={:#06x}",
            node.name,
            node.role,
            node.rloc16,
            node.partition_id
                .map_or_else(|| "-".to_string(), |p| format!("{:#010x}", p)),
            node.parent_rloc16
                .map_or_else(|| "-".to_string(), |p| format!("{:#06x}", p)),
            node.children,
            node.active_routers,
            node.devices,
            node.channel,
            node.pan_id
        );
        let Some(iface) = sim.interface(index) else {
            continue;
        };
        for address in iface.ipv6().addresses() {
            component_info!("topology", "{}   address {}", node.name, address);
        }
        for route in iface.ipv6().routes() {
            component_info!(
                "topology",
                "{}   route {}/{} via {:?} ({:?})",
                node.name,
                std::net::Ipv6Addr::from(route.prefix),
                route.prefix_len,
                route.next_hop,
                route.kind
            );
        }
    }
    let stats = sim.stats();
    component_info!(
        "topology",
        "frames sent={} delivered={} lost={} retransmitted={} management forwarded={} dropped={}",
        stats.frames_sent,
        stats.frames_delivered,
        stats.frames_lost,
        stats.retransmissions,
        stats.management_forwarded,
        stats.management_dropped
    );
}
