//! Worker collaborators: stand-ins for the processes being scheduled.
//!
//! The engine talks to workers through the [`WorkerPool`] trait using the
//! wire format in [`crate::message`], matched by simulated PID. Two
//! implementations:
//!
//! - [`ThreadWorkerPool`] runs each worker on its own OS thread behind a
//!   request/response channel pair — an explicit wake notification, so no
//!   busy-wait polling of shared state anywhere.
//! - [`ScriptedWorkerPool`] plays back predetermined outcomes synchronously,
//!   for deterministic tests. It still round-trips every message through the
//!   wire format.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;

use anyhow::{anyhow, bail, Context, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::WorkerBehavior;
use crate::message::{self, BurstOutcome, TERMINATION_CODE};
use crate::types::{SimPid, TimeNs};

/// How the engine reaches its workers. Spawn/channel failures are fatal to
/// the run; the engine does not attempt cross-worker cleanup.
pub trait WorkerPool {
    /// Start the worker standing in for `pid`.
    fn spawn_worker(&mut self, pid: SimPid) -> Result<()>;
    /// Deliver a wire-format request to the worker for `pid`.
    fn send_request(&mut self, pid: SimPid, request: &str) -> Result<()>;
    /// Block until the worker for `pid` responds. This is the engine's only
    /// blocking point, and it is keyed to the dispatched PID alone.
    fn await_response(&mut self, pid: SimPid) -> Result<String>;
    /// Best-effort teardown of any workers still alive.
    fn shutdown(&mut self);
}

/// Decide one burst from the worker's point of view.
///
/// A single uniform draw picks between termination, I/O blocking, preemption
/// and full-quantum use; every partial outcome uses a uniform slice of the
/// granted quantum.
pub fn decide_burst<R: Rng>(
    rng: &mut R,
    behavior: &WorkerBehavior,
    quantum_ns: TimeNs,
) -> BurstOutcome {
    let draw: f64 = rng.gen();
    let term = behavior.termination_probability;
    let io = term + behavior.io_block_probability;
    let preempt = io + behavior.preemption_probability;
    if draw < term {
        BurstOutcome::Terminated {
            used_ns: rng.gen_range(0..=quantum_ns),
        }
    } else if draw < io {
        BurstOutcome::BlockedForIo {
            used_ns: rng.gen_range(0..=quantum_ns),
            wake_secs: rng.gen_range(0..=behavior.max_wake_secs),
            wake_millis: rng.gen_range(0..1000),
        }
    } else if draw < preempt {
        BurstOutcome::Preempted {
            used_ns: rng.gen_range(0..=quantum_ns),
        }
    } else {
        BurstOutcome::UsedFullQuantum {
            used_ns: quantum_ns,
        }
    }
}

struct WorkerChannels {
    request_tx: Sender<String>,
    response_rx: Receiver<String>,
    handle: JoinHandle<()>,
}

/// One OS thread per live worker, request/response channels keyed by PID.
pub struct ThreadWorkerPool {
    behavior: WorkerBehavior,
    seed: u64,
    workers: HashMap<SimPid, WorkerChannels>,
}

impl ThreadWorkerPool {
    pub fn new(behavior: WorkerBehavior, seed: u64) -> Self {
        ThreadWorkerPool {
            behavior,
            seed,
            workers: HashMap::new(),
        }
    }
}

impl WorkerPool for ThreadWorkerPool {
    fn spawn_worker(&mut self, pid: SimPid) -> Result<()> {
        if self.workers.contains_key(&pid) {
            bail!("worker for pid {pid} already exists");
        }
        let (request_tx, request_rx) = channel::<String>();
        let (response_tx, response_rx) = channel::<String>();
        let behavior = self.behavior.clone();
        // Distinct deterministic stream per worker slot.
        let seed = self
            .seed
            .wrapping_add(u64::from(pid.0 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let handle = std::thread::Builder::new()
            .name(format!("worker-{pid}"))
            .spawn(move || worker_main(request_rx, response_tx, behavior, seed))
            .with_context(|| format!("failed to spawn worker thread for pid {pid}"))?;
        self.workers.insert(
            pid,
            WorkerChannels {
                request_tx,
                response_rx,
                handle,
            },
        );
        Ok(())
    }

    fn send_request(&mut self, pid: SimPid, request: &str) -> Result<()> {
        let worker = self
            .workers
            .get(&pid)
            .ok_or_else(|| anyhow!("no worker for pid {pid}"))?;
        worker
            .request_tx
            .send(request.to_string())
            .map_err(|_| anyhow!("request channel to worker {pid} closed"))
    }

    fn await_response(&mut self, pid: SimPid) -> Result<String> {
        let worker = self
            .workers
            .get(&pid)
            .ok_or_else(|| anyhow!("no worker for pid {pid}"))?;
        let response = worker
            .response_rx
            .recv()
            .map_err(|_| anyhow!("response channel from worker {pid} closed"))?;
        // A terminating worker's thread is done; reap it so the PID slot can
        // be respawned after reuse.
        if response.starts_with(TERMINATION_CODE) {
            if let Some(worker) = self.workers.remove(&pid) {
                let _ = worker.handle.join();
            }
        }
        Ok(response)
    }

    fn shutdown(&mut self) {
        for (_, worker) in self.workers.drain() {
            drop(worker.request_tx);
            let _ = worker.handle.join();
        }
    }
}

/// Worker thread body: answer quantum grants until termination or until the
/// engine hangs up.
fn worker_main(
    requests: Receiver<String>,
    responses: Sender<String>,
    behavior: WorkerBehavior,
    seed: u64,
) {
    let mut rng = SmallRng::seed_from_u64(seed);
    while let Ok(line) = requests.recv() {
        let Ok(quantum_ns) = message::parse_quantum_grant(&line) else {
            break;
        };
        let outcome = decide_burst(&mut rng, &behavior, quantum_ns);
        let terminated = matches!(outcome, BurstOutcome::Terminated { .. });
        if responses.send(outcome.encode()).is_err() || terminated {
            break;
        }
    }
}

/// Synchronous pool that plays back a fixed outcome sequence per PID slot.
///
/// A slot's script outlives PID reuse: when a terminated PID is reallocated,
/// the replacement process continues consuming the same queue. Scripts
/// should end in a termination outcome or the engine will run the slot dry.
#[derive(Debug, Default)]
pub struct ScriptedWorkerPool {
    scripts: HashMap<SimPid, VecDeque<BurstOutcome>>,
    pending: HashMap<SimPid, String>,
}

impl ScriptedWorkerPool {
    pub fn new() -> Self {
        ScriptedWorkerPool::default()
    }

    /// Assign the outcome sequence for one PID slot.
    pub fn script(mut self, pid: SimPid, outcomes: Vec<BurstOutcome>) -> Self {
        self.scripts.insert(pid, outcomes.into());
        self
    }
}

impl WorkerPool for ScriptedWorkerPool {
    fn spawn_worker(&mut self, pid: SimPid) -> Result<()> {
        if !self.scripts.contains_key(&pid) {
            bail!("no script for pid {pid}");
        }
        Ok(())
    }

    fn send_request(&mut self, pid: SimPid, request: &str) -> Result<()> {
        // Validate the request side of the wire format even though the
        // scripted outcome ignores the quantum.
        message::parse_quantum_grant(request)?;
        let outcome = self
            .scripts
            .get_mut(&pid)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| anyhow!("script exhausted for pid {pid}"))?;
        self.pending.insert(pid, outcome.encode());
        Ok(())
    }

    fn await_response(&mut self, pid: SimPid) -> Result<String> {
        self.pending
            .remove(&pid)
            .ok_or_else(|| anyhow!("no response pending for pid {pid}"))
    }

    fn shutdown(&mut self) {}
}
