//! mlfq_simulator - Deterministic virtual-clock simulation of a multi-level
//! feedback queue process scheduler.
//!
//! Synthetic processes are generated on a virtual timeline, enqueued into an
//! MLFQ with demotion on quantum use and aging-based promotion, dispatched
//! for simulated CPU bursts, and retired or re-enqueued according to the
//! burst outcome their worker reports over a fixed-format text protocol.
//!
//! # Architecture
//!
//! - **Engine**: the generation/wake/dispatch/response loop on the virtual clock
//! - **FeedbackQueue**: priority ready levels plus a wake-time-ordered blocked list
//! - **Workers**: per-PID collaborators answering quantum grants (threaded or scripted)
//! - **PidAllocator**: bounded round-robin pool of simulated PIDs
//! - **Trace**: the run's observable event stream
//!
//! # Usage
//!
//! ```rust,no_run
//! use mlfq_simulator::*;
//!
//! let config = SimConfig::default();
//! let workers = ThreadWorkerPool::new(config.worker.clone(), config.seed);
//! let trace = SchedulerEngine::new(config, workers)?.run()?;
//! trace.dump();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod fmt;
pub mod message;
pub mod pcb;
pub mod pid;
pub mod queue;
pub mod trace;
pub mod types;
pub mod worker;

// Re-export the main public types for convenience.
pub use clock::VirtualClock;
pub use config::{parse_seed, AgingConfig, SimConfig, WorkerBehavior};
pub use engine::SchedulerEngine;
pub use fmt::{FmtN, SimFormat};
pub use message::BurstOutcome;
pub use pcb::{ProcessControlBlock, ProcessState, SchedulingClass};
pub use pid::PidAllocator;
pub use queue::FeedbackQueue;
pub use trace::{Trace, TraceEvent, TraceKind};
pub use types::{SimPid, TimeNs};
pub use worker::{ScriptedWorkerPool, ThreadWorkerPool, WorkerPool};
