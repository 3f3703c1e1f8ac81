//! Simulation tunables.
//!
//! Plain structs with `Default` impls; the CLI overrides individual fields.
//! Defaults follow the classic textbook parameters: twenty processes total,
//! four queue levels, a 10ms base quantum halved per level, and up to two
//! seconds between generations.

use anyhow::{bail, Result};
use tracing::warn;

use crate::clock::VirtualClock;
use crate::types::TimeNs;

/// Everything the engine needs to run one simulation.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Total processes generated over the whole run.
    pub max_total_processes: u32,
    /// Max simultaneously-live processes; also the PID pool capacity.
    pub max_live_processes: usize,
    /// Number of ready-queue priority levels.
    pub num_queue_levels: usize,
    /// Quantum granted at priority 0; level `p` gets `base >> p`.
    pub base_quantum_ns: TimeNs,
    /// Bounds on the random interval between process generations.
    pub min_generation_interval: VirtualClock,
    pub max_generation_interval: VirtualClock,
    /// Bounds on the simulated cost of one dispatch decision.
    pub min_scheduling_overhead: VirtualClock,
    pub max_scheduling_overhead: VirtualClock,
    /// Bounds on the clock increment added every engine iteration.
    pub min_iteration_increment: VirtualClock,
    pub max_iteration_increment: VirtualClock,
    /// Chance a generated process is real-time class.
    pub real_time_probability: f64,
    /// Simulated interrupt-handling cost per blocked-process wake-up.
    pub wake_up_increment: VirtualClock,
    pub aging: AgingConfig,
    pub worker: WorkerBehavior,
    /// PRNG seed; the whole run is deterministic for a fixed seed.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            max_total_processes: 20,
            max_live_processes: 18,
            num_queue_levels: 4,
            base_quantum_ns: 10_000_000,
            min_generation_interval: VirtualClock::zero(),
            max_generation_interval: VirtualClock::from_parts(2, 0),
            min_scheduling_overhead: VirtualClock::from_parts(0, 100),
            max_scheduling_overhead: VirtualClock::from_parts(0, 1_000),
            min_iteration_increment: VirtualClock::from_parts(1, 0),
            max_iteration_increment: VirtualClock::from_parts(1, 1_000),
            real_time_probability: 0.05,
            wake_up_increment: VirtualClock::from_parts(0, 1_000),
            aging: AgingConfig::default(),
            worker: WorkerBehavior::default(),
            seed: DEFAULT_SEED,
        }
    }
}

impl SimConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.num_queue_levels == 0 {
            bail!("num_queue_levels must be at least 1");
        }
        if self.num_queue_levels > 63 {
            bail!("num_queue_levels must be at most 63: the quantum is halved per level");
        }
        if self.max_live_processes == 0 {
            bail!("max_live_processes must be at least 1");
        }
        if self.base_quantum_ns == 0 {
            bail!("base_quantum_ns must be nonzero");
        }
        if self.aging.cutoff_level == 0 {
            bail!("aging cutoff_level must be at least 1: level 0 has nowhere to promote to");
        }
        for (name, min, max) in [
            (
                "generation interval",
                self.min_generation_interval,
                self.max_generation_interval,
            ),
            (
                "scheduling overhead",
                self.min_scheduling_overhead,
                self.max_scheduling_overhead,
            ),
            (
                "iteration increment",
                self.min_iteration_increment,
                self.max_iteration_increment,
            ),
        ] {
            if min > max {
                bail!("{name} bounds are inverted: {min} > {max}");
            }
        }
        if self.max_iteration_increment.is_zero() {
            bail!("max_iteration_increment must be nonzero or the clock can stall");
        }
        for (name, p) in [
            ("real_time_probability", self.real_time_probability),
            (
                "termination_probability",
                self.worker.termination_probability,
            ),
            ("io_block_probability", self.worker.io_block_probability),
            ("preemption_probability", self.worker.preemption_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                bail!("{name} must be within [0, 1], got {p}");
            }
        }
        let outcome_sum = self.worker.termination_probability
            + self.worker.io_block_probability
            + self.worker.preemption_probability;
        if outcome_sum > 1.0 {
            bail!("worker outcome probabilities sum to {outcome_sum}, must be at most 1");
        }
        Ok(())
    }
}

/// Anti-starvation promotion thresholds. Heuristic, not load-bearing:
/// a ready-level head below `util_scale / count` CPU utilization that has
/// waited at least `wait_threshold` since last executing moves up one level.
#[derive(Debug, Clone)]
pub struct AgingConfig {
    /// First level eligible for promotion; the top levels never age.
    pub cutoff_level: usize,
    /// Minimum wait since last executing before promotion.
    pub wait_threshold: VirtualClock,
    /// Utilization threshold numerator; the divisor is the current count of
    /// processes in the queue structure.
    pub util_scale: f64,
}

impl Default for AgingConfig {
    fn default() -> Self {
        AgingConfig {
            cutoff_level: 2,
            wait_threshold: VirtualClock::from_parts(1, 0),
            util_scale: 1.0,
        }
    }
}

/// Outcome probabilities for the random worker stand-ins. Whatever is left
/// after termination, I/O and preemption is a full-quantum burst.
#[derive(Debug, Clone)]
pub struct WorkerBehavior {
    pub termination_probability: f64,
    pub io_block_probability: f64,
    pub preemption_probability: f64,
    /// Upper bound (seconds) on the random I/O wake delay.
    pub max_wake_secs: u32,
}

impl Default for WorkerBehavior {
    fn default() -> Self {
        WorkerBehavior {
            termination_probability: 0.2,
            io_block_probability: 0.35,
            preemption_probability: 0.1,
            max_wake_secs: 3,
        }
    }
}

const DEFAULT_SEED: u64 = 42;

/// Parse a seed argument: a decimal integer, or `"entropy"` to draw one from
/// the OS and log it so the run can be reproduced.
pub fn parse_seed(arg: Option<&str>) -> u64 {
    let Some(text) = arg else {
        return DEFAULT_SEED;
    };
    if text.eq_ignore_ascii_case("entropy") {
        let mut buf = [0u8; 8];
        return match std::fs::File::open("/dev/urandom")
            .and_then(|mut f| std::io::Read::read_exact(&mut f, &mut buf))
        {
            Ok(()) => {
                let seed = u64::from_le_bytes(buf);
                warn!(seed, "seeded from OS entropy; pass --seed {seed} to reproduce this run");
                seed
            }
            Err(e) => {
                warn!(error = %e, "failed to read OS entropy, using default seed");
                DEFAULT_SEED
            }
        };
    }
    match text.parse::<u64>() {
        Ok(seed) => seed,
        Err(_) => {
            warn!(seed = text, "unparseable seed, using default");
            DEFAULT_SEED
        }
    }
}
