use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam_channel::unbounded;

use swarmlife::core::domain::{BoundaryPolicy, ExecutionModel, NeighborMode, Params, DEFAULT_BATCH_SIZE};
use swarmlife::sim::runner::SimulationRunner;
use swarmlife::sim::world::Simulation;
use swarmlife::sim::SimEvent;

// --- CLI Definitions ---

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Boundary {
    Clamp,
    Wrap,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless particle-life simulation runner", long_about = None)]
struct Args {
    /// JSON parameter file; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of ticks to run
    #[arg(short = 'n', long, default_value_t = 600)]
    ticks: u64,

    /// Time step per tick
    #[arg(long, default_value_t = 0.02)]
    dt: f64,

    /// Worker threads for the parallel model (0 = all cores)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Free particles spawned at start
    #[arg(short, long)]
    particles: Option<usize>,

    /// Number of particle types
    #[arg(long)]
    types: Option<usize>,

    /// Swarms spawned at start
    #[arg(long)]
    swarms: Option<usize>,

    /// RNG seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Edge behaviour
    #[arg(long, value_enum)]
    boundary: Option<Boundary>,

    /// Use the sequential in-place engine instead of the parallel scheduler
    #[arg(long)]
    sequential: bool,

    /// With --sequential: quadtree neighbour search, rebuilt every N ticks
    #[arg(long, value_name = "N")]
    quadtree: Option<u32>,

    /// Print statistics every N ticks
    #[arg(long, default_value_t = 60)]
    report_every: u64,
}

// --- Initialization Helpers ---

fn load_params(path: &Path) -> Result<Params> {
    let file = File::open(path).with_context(|| format!("Failed to open config {}", path.display()))?;
    let params: Params = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(params)
}

fn build_params(args: &Args) -> Result<Params> {
    let mut params = match &args.config {
        Some(path) => load_params(path)?,
        None => Params::default(),
    };

    if let Some(t) = args.threads {
        params.threads = t;
    }
    if let Some(n) = args.particles {
        params.particle_count = n;
    }
    if let Some(n) = args.types {
        params.num_types = n;
    }
    if let Some(n) = args.swarms {
        params.swarm.count = n;
    }
    if let Some(s) = args.seed {
        params.seed = s;
    }
    if let Some(b) = args.boundary {
        params.world.boundary = match b {
            Boundary::Clamp => BoundaryPolicy::Clamp,
            Boundary::Wrap => BoundaryPolicy::Wrap,
        };
    }

    if args.sequential {
        let neighbors = match args.quadtree {
            Some(rebuild_interval) => NeighborMode::QuadTree { rebuild_interval },
            None => NeighborMode::BruteForce,
        };
        params.execution = ExecutionModel::Sequential { neighbors };
    } else if args.quadtree.is_some() {
        log::warn!("--quadtree only applies with --sequential; using the parallel scheduler");
        if !matches!(params.execution, ExecutionModel::Parallel { .. }) {
            params.execution = ExecutionModel::Parallel { batch_size: DEFAULT_BATCH_SIZE };
        }
    }

    Ok(params)
}

// --- Main ---

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // 1. Configure
    let params = build_params(&args)?;
    let sim = Simulation::new(params).context("Failed to initialize simulation")?;

    // 2. Spawn Worker Thread
    let (tx, rx) = unbounded();
    let runner = SimulationRunner::new(sim, args.dt).max_ticks(args.ticks);

    let worker = thread::Builder::new()
        .name("Sim-Worker".to_string())
        .spawn(move || runner.run(tx))
        .context("Failed to spawn simulation worker")?;

    // 3. Event Loop
    let report_every = args.report_every.max(1);
    let mut halted = None;
    for event in rx {
        match event {
            SimEvent::Ready { particles, swarms } => {
                log::info!("Simulation ready: {} particles, {} swarms", particles, swarms);
            }
            SimEvent::Log(msg) => log::info!("{}", msg),
            SimEvent::TickUpdate(stats) => {
                if stats.tick % report_every == 0 {
                    println!(
                        "tick {:>6} | n={:<6} | mean |v| {:>8.4} | max |v| {:>8.4} | KE {:>10.3}",
                        stats.tick, stats.particle_count, stats.mean_speed, stats.max_speed, stats.kinetic_energy
                    );
                }
            }
            SimEvent::Heartbeat(rate) => log::debug!("{:.1} ticks/s", rate),
            SimEvent::Halted(reason) => halted = Some(reason),
            SimEvent::Finished => break,
        }
    }

    let sim = worker
        .join()
        .map_err(|_| anyhow::anyhow!("Simulation worker panicked"))?;

    if let Some(reason) = halted {
        anyhow::bail!("Simulation halted at tick {}: {}", sim.tick(), reason);
    }

    log::info!("Done: {} ticks, {} particles remaining", sim.tick(), sim.len());
    Ok(())
}
