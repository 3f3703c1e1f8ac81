//! The scheduling engine: generation, dispatch, and response handling.
//!
//! One `run()` drives an entire simulation on a single logical thread. The
//! loop generates processes at random virtual-time intervals, wakes due
//! blocked processes, dispatches the highest-priority ready process with a
//! quantum halved per priority level, and reacts to the worker's burst
//! response. The only blocking point is awaiting the response for the
//! just-dispatched PID; exactly one dispatch is ever in flight.

use anyhow::{Context, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::clock::VirtualClock;
use crate::config::SimConfig;
use crate::fmt::{set_log_clock, FmtN};
use crate::message::{self, BurstOutcome};
use crate::pcb::{ProcessControlBlock, ProcessState, SchedulingClass};
use crate::pid::PidAllocator;
use crate::queue::FeedbackQueue;
use crate::trace::{Trace, TraceKind};
use crate::worker::WorkerPool;

/// Orchestrates one end-to-end simulation.
pub struct SchedulerEngine<W> {
    config: SimConfig,
    workers: W,
    clock: VirtualClock,
    pids: PidAllocator,
    queue: FeedbackQueue,
    rng: SmallRng,
    trace: Trace,
    total_generated: u32,
}

impl<W: WorkerPool> SchedulerEngine<W> {
    pub fn new(config: SimConfig, workers: W) -> Result<Self> {
        config.validate()?;
        let pids = PidAllocator::new(config.max_live_processes);
        let queue = FeedbackQueue::new(
            config.num_queue_levels,
            config.aging.clone(),
            config.wake_up_increment,
        );
        let rng = SmallRng::seed_from_u64(config.seed);
        Ok(SchedulerEngine {
            config,
            workers,
            clock: VirtualClock::zero(),
            pids,
            queue,
            rng,
            trace: Trace::new(),
            total_generated: 0,
        })
    }

    /// Run the simulation to completion: until the generation cap is reached
    /// and every process has exited.
    pub fn run(mut self) -> Result<Trace> {
        let mut next_generation_at = self.random_clock(
            self.config.min_generation_interval,
            self.config.max_generation_interval,
        );
        info!(
            total = self.config.max_total_processes,
            levels = self.config.num_queue_levels,
            base_quantum_ns = %FmtN(self.config.base_quantum_ns),
            seed = self.config.seed,
            "simulation start"
        );

        loop {
            set_log_clock(self.clock);

            self.maybe_generate(&mut next_generation_at)?;

            if self.queue.blocked_count() > 0 {
                self.wake_due()?;
            }

            if self.queue.ready_count() > 0 {
                self.dispatch_one()?;
            }

            let increment = self.random_clock(
                self.config.min_iteration_increment,
                self.config.max_iteration_increment,
            );
            self.clock.advance(increment);

            if self.total_generated >= self.config.max_total_processes && self.queue.is_empty() {
                break;
            }
        }

        set_log_clock(self.clock);
        info!(generated = self.total_generated, "simulation complete");
        self.workers.shutdown();
        Ok(self.trace)
    }

    /// Generate one process if its time has come and both the total cap and
    /// the live cap allow it. PID exhaustion defers generation to a later
    /// iteration instead of failing the run.
    fn maybe_generate(&mut self, next_generation_at: &mut VirtualClock) -> Result<()> {
        if self.total_generated >= self.config.max_total_processes
            || self.queue.count() >= self.config.max_live_processes
            || self.clock < *next_generation_at
        {
            return Ok(());
        }

        let Some(pid) = self.pids.reserve_next() else {
            warn!("simulated pid pool exhausted, deferring generation");
            self.trace.record(self.clock, TraceKind::GenerationDeferred);
            return Ok(());
        };

        let class = if self.rng.gen::<f64>() < self.config.real_time_probability {
            SchedulingClass::RealTime
        } else {
            SchedulingClass::Normal
        };
        let pcb = ProcessControlBlock::new(pid, class, self.clock);
        let priority = self.queue.enqueue_ready(pcb)?;
        self.workers
            .spawn_worker(pid)
            .with_context(|| format!("failed to start worker for pid {pid}"))?;
        self.total_generated += 1;

        info!(pid = %pid, queue = priority, class = ?class, "generated");
        self.trace
            .record(self.clock, TraceKind::Generated { pid, priority });

        next_generation_at.advance(self.random_clock(
            self.config.min_generation_interval,
            self.config.max_generation_interval,
        ));
        Ok(())
    }

    /// Sweep the blocked list, waking everything whose I/O event time has
    /// been reached. Each wake charges interrupt-handling overhead to the
    /// clock and is individually recorded.
    fn wake_due(&mut self) -> Result<()> {
        let mut now = self.clock;
        let woken = self.queue.wake_due(&mut now)?;
        self.clock = now;
        for wake in &woken {
            set_log_clock(wake.at);
            info!(pid = %wake.pid, queue = wake.priority, "woke blocked process");
            self.trace.record(
                wake.at,
                TraceKind::Woken {
                    pid: wake.pid,
                    priority: wake.priority,
                },
            );
        }
        set_log_clock(self.clock);
        Ok(())
    }

    /// Dispatch the next ready process and handle its burst response.
    fn dispatch_one(&mut self) -> Result<()> {
        let mut pcb = self.queue.dequeue_ready(self.clock)?;
        pcb.transition(ProcessState::Running)?;
        pcb.time_of_last_burst = self.clock;

        let pid = pcb.sim_pid();
        let quantum_ns = self.config.base_quantum_ns >> pcb.priority;
        info!(pid = %pid, queue = pcb.priority, quantum_ns = %FmtN(quantum_ns), "dispatched");
        self.trace.record(
            self.clock,
            TraceKind::Dispatched {
                pid,
                priority: pcb.priority,
                quantum_ns,
            },
        );

        self.workers
            .send_request(pid, &message::encode_quantum_grant(quantum_ns))?;

        let overhead = self.random_clock(
            self.config.min_scheduling_overhead,
            self.config.max_scheduling_overhead,
        );
        self.clock.advance(overhead);
        set_log_clock(self.clock);

        let response = self.workers.await_response(pid)?;
        self.handle_response(pcb, quantum_ns, &response)
    }

    /// Apply a burst response to the dispatched PCB: account the CPU time,
    /// drive the state machine, and put the block wherever it goes next.
    fn handle_response(
        &mut self,
        mut pcb: ProcessControlBlock,
        quantum_ns: u64,
        response: &str,
    ) -> Result<()> {
        let pid = pcb.sim_pid();
        let outcome = BurstOutcome::parse(response)
            .with_context(|| format!("malformed response from worker {pid}"))?;

        let used_ns = outcome.used_ns();
        let used = VirtualClock::from_nanos(used_ns);
        pcb.time_used_during_last_burst = used;
        pcb.total_cpu_time.advance(used);

        debug!(pid = %pid, used_ns = %FmtN(used_ns), "message received");
        self.trace
            .record(self.clock, TraceKind::MessageReceived { pid, used_ns });
        if used_ns < quantum_ns {
            self.trace
                .record(self.clock, TraceKind::PartialQuantumUse { pid, used_ns });
        }

        match outcome {
            BurstOutcome::Terminated { .. } => {
                pcb.transition(ProcessState::Exit)?;
                self.pids.release(pid);
                info!(pid = %pid, total_cpu = %pcb.total_cpu_time, "terminated");
                self.trace.record(self.clock, TraceKind::Terminated { pid });
            }
            BurstOutcome::UsedFullQuantum { .. } => {
                pcb.transition(ProcessState::Ready)?;
                let priority = self.queue.enqueue_ready(pcb)?;
                info!(pid = %pid, queue = priority, "re-enqueued after full quantum");
                self.trace
                    .record(self.clock, TraceKind::Enqueued { pid, priority });
            }
            BurstOutcome::BlockedForIo {
                wake_secs,
                wake_millis,
                ..
            } => {
                pcb.transition(ProcessState::Blocked)?;
                let delay = VirtualClock::sum(
                    VirtualClock::from_parts(wake_secs, 0),
                    VirtualClock::from_nanos(u64::from(wake_millis) * 1_000_000),
                );
                let wake_at = VirtualClock::sum(self.clock, delay);
                info!(pid = %pid, wake_at = %wake_at, "blocked for io");
                self.trace
                    .record(self.clock, TraceKind::Blocked { pid, wake_at });
                self.queue.enqueue_blocked(pcb, wake_at)?;
            }
            BurstOutcome::Preempted { .. } => {
                pcb.transition(ProcessState::Ready)?;
                let priority = pcb.priority;
                info!(pid = %pid, queue = priority, "preempted, requeued at front");
                self.trace
                    .record(self.clock, TraceKind::Preempted { pid, priority });
                self.queue.requeue_at_front(pcb);
            }
        }

        self.clock.advance(used);
        set_log_clock(self.clock);
        Ok(())
    }

    fn random_clock(&mut self, min: VirtualClock, max: VirtualClock) -> VirtualClock {
        VirtualClock::random_in_range(&mut self.rng, min, max)
    }
}
