//! Local demonstration runner: spins up a CPU/GPU-tagged worker pool over
//! one heteroprio context, submits a batch of synthetic tasks, and prints a
//! drain summary. Not a production entry point — a CLI ambient-stack
//! surface for exercising the scheduler end to end.

mod workers;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use heteroprio_core::arch::index_to_arch_bit;
use heteroprio_core::{Heteroprio, Task};

use workers::run_pool;

#[derive(Parser, Debug)]
#[command(author, version, about = "Heteroprio scheduler demonstration", long_about = None)]
struct Args {
    /// Number of CPU-class workers.
    #[arg(long, default_value_t = 2)]
    cpu_workers: usize,

    /// Number of GPU-class workers.
    #[arg(long, default_value_t = 1)]
    gpu_workers: usize,

    /// Total synthetic tasks to submit.
    #[arg(long, default_value_t = 200)]
    tasks: u64,

    /// Per-worker local prefetch depth.
    #[arg(long, default_value_t = 4)]
    max_prefetch: usize,

    /// Slow factor applied to the GPU arch on the shared bucket.
    #[arg(long, default_value_t = 2.0)]
    gpu_slow_factor: f64,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ArchKind {
    Cpu,
    Gpu,
}

const ARCH_CPU: usize = 0;
const ARCH_GPU: usize = 1;

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level)).init();

    let shutdown = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    install_sigint_handler(Arc::clone(&shutdown));

    run_demo(&args, shutdown)
}

fn run_demo(args: &Args, shutdown: Arc<AtomicBool>) -> Result<()> {
    let nworkers = args.cpu_workers + args.gpu_workers;
    let sched = Arc::new(
        Heteroprio::new(heteroprio_core::DEFAULT_MAX_PRIO, args.max_prefetch, nworkers)
            .with_default_mapping(&[ARCH_CPU, ARCH_GPU]),
    );
    sched.set_faster_arch(ARCH_CPU, 0)?;
    sched.set_arch_slow_factor(ARCH_GPU, 0, args.gpu_slow_factor)?;

    let mut worker_ids = Vec::with_capacity(nworkers);
    for w in 0..args.cpu_workers {
        sched.add_worker(w, index_to_arch_bit(ARCH_CPU));
        worker_ids.push((w, ArchKind::Cpu));
    }
    for w in 0..args.gpu_workers {
        let id = args.cpu_workers + w;
        sched.add_worker(id, index_to_arch_bit(ARCH_GPU));
        worker_ids.push((id, ArchKind::Gpu));
    }

    sched.check_consistency();

    let where_both = index_to_arch_bit(ARCH_CPU) | index_to_arch_bit(ARCH_GPU);
    for i in 0..args.tasks {
        sched.push(Task::new(i, 0, where_both))?;
    }
    log::info!("submitted {} tasks across {} worker(s)", args.tasks, nworkers);

    let start = Instant::now();
    let executed = run_pool(Arc::clone(&sched), worker_ids, Arc::clone(&shutdown), args.tasks);
    let elapsed = start.elapsed();

    log::info!("drained {executed} task(s) in {elapsed:?} ({:.0} tasks/sec)", executed as f64 / elapsed.as_secs_f64().max(1e-9));
    if executed != args.tasks as usize {
        log::warn!("executed count {executed} does not match submitted count {}", args.tasks);
    }
    Ok(())
}

#[cfg(unix)]
fn install_sigint_handler(shutdown: Arc<AtomicBool>) {
    use signal_hook::consts::SIGINT;
    if let Err(e) = signal_hook::flag::register(SIGINT, shutdown) {
        log::warn!("failed to install SIGINT handler: {e}");
    }
}
