use instant::Instant;

use vecpool::sim::{Sim, ENTITY_COUNT};
use vecpool::vector;

/// Simulation timestep (60 Hz).
const DT: f32 = 1.0 / 60.0;
/// Ticks per comparison run (10 seconds of simulated time).
const TICKS: u32 = 600;

fn main() {
    env_logger::init();
    log::info!("vecpool demo starting up");

    if let Err(e) = run() {
        log::error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), vecpool::PoolError> {
    let mut rng = fastrand::Rng::with_seed(0xC0FFEE);

    vector::reset_allocations();
    let mut sim = Sim::new(&mut rng);
    let start = Instant::now();
    for _ in 0..TICKS {
        sim.step_pooled(DT)?;
    }
    log::info!(
        "pooled:   {TICKS} ticks x {ENTITY_COUNT} entities in {:.2?}, {} vector allocations ({} by the pool)",
        start.elapsed(),
        vector::allocations(),
        sim.pool().total_allocations()
    );

    vector::reset_allocations();
    let mut sim = Sim::new(&mut rng);
    let start = Instant::now();
    for _ in 0..TICKS {
        sim.step_unpooled(DT)?;
    }
    log::info!(
        "unpooled: {TICKS} ticks x {ENTITY_COUNT} entities in {:.2?}, {} vector allocations",
        start.elapsed(),
        vector::allocations()
    );

    Ok(())
}
