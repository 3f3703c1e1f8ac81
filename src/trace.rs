//! Discrete event records for a simulation run.
//!
//! Every scheduling action the engine takes — generation, dispatch, wake-up,
//! preemption, enqueue, message receipt — is recorded with the virtual clock
//! value it happened at. The trace is the run's observable output: tests
//! assert on it and the CLI can dump it.

use crate::clock::VirtualClock;
use crate::types::{SimPid, TimeNs};

/// A single event with the virtual time it occurred at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub clock: VirtualClock,
    pub kind: TraceKind,
}

/// The kind of scheduling event recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceKind {
    /// A new process entered the system at the given ready level.
    Generated { pid: SimPid, priority: usize },
    /// Generation was deferred because the PID pool was exhausted.
    GenerationDeferred,
    /// A process was handed the CPU with the given quantum.
    Dispatched {
        pid: SimPid,
        priority: usize,
        quantum_ns: TimeNs,
    },
    /// A burst response arrived from a worker.
    MessageReceived { pid: SimPid, used_ns: TimeNs },
    /// The burst used less than the granted quantum.
    PartialQuantumUse { pid: SimPid, used_ns: TimeNs },
    /// A process went back to a ready level after using its whole quantum.
    Enqueued { pid: SimPid, priority: usize },
    /// A process started waiting for simulated I/O.
    Blocked { pid: SimPid, wake_at: VirtualClock },
    /// A blocked process became ready again at its priority level.
    Woken { pid: SimPid, priority: usize },
    /// A process was preempted and returned to the head of its level.
    Preempted { pid: SimPid, priority: usize },
    /// A process exited and its PID was released.
    Terminated { pid: SimPid },
}

/// A complete run's events in the order they happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    events: Vec<TraceEvent>,
}

impl Trace {
    pub(crate) fn new() -> Self {
        Trace::default()
    }

    pub(crate) fn record(&mut self, clock: VirtualClock, kind: TraceKind) {
        self.events.push(TraceEvent { clock, kind });
    }

    /// All events in chronological order.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Number of processes generated during the run.
    pub fn generated_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, TraceKind::Generated { .. }))
            .count()
    }

    /// Number of times the given process was handed the CPU.
    pub fn dispatch_count(&self, pid: SimPid) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, TraceKind::Dispatched { pid: p, .. } if p == pid))
            .count()
    }

    /// Total dispatches across every process.
    pub fn total_dispatches(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, TraceKind::Dispatched { .. }))
            .count()
    }

    /// Number of processes that reached exit.
    pub fn terminated_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, TraceKind::Terminated { .. }))
            .count()
    }

    /// Whether the given process exited during the run.
    pub fn terminated(&self, pid: SimPid) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.kind, TraceKind::Terminated { pid: p } if p == pid))
    }

    /// Clock value of the last recorded event, if any.
    pub fn final_clock(&self) -> Option<VirtualClock> {
        self.events.last().map(|e| e.clock)
    }

    /// Pretty-print the trace for debugging.
    pub fn dump(&self) {
        for event in &self.events {
            let desc = match &event.kind {
                TraceKind::Generated { pid, priority } => {
                    format!("GENERATE pid={pid} queue={priority}")
                }
                TraceKind::GenerationDeferred => "DEFER    pid pool exhausted".to_string(),
                TraceKind::Dispatched {
                    pid,
                    priority,
                    quantum_ns,
                } => format!("DISPATCH pid={pid} queue={priority} quantum={quantum_ns}"),
                TraceKind::MessageReceived { pid, used_ns } => {
                    format!("MESSAGE  pid={pid} used={used_ns}")
                }
                TraceKind::PartialQuantumUse { pid, used_ns } => {
                    format!("PARTIAL  pid={pid} used={used_ns}")
                }
                TraceKind::Enqueued { pid, priority } => {
                    format!("ENQUEUE  pid={pid} queue={priority}")
                }
                TraceKind::Blocked { pid, wake_at } => {
                    format!("BLOCK    pid={pid} wake_at=[{wake_at}]")
                }
                TraceKind::Woken { pid, priority } => {
                    format!("WAKE     pid={pid} queue={priority}")
                }
                TraceKind::Preempted { pid, priority } => {
                    format!("PREEMPT  pid={pid} queue={priority}")
                }
                TraceKind::Terminated { pid } => format!("EXIT     pid={pid}"),
            };
            eprintln!("[{}] {desc}", event.clock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_helpers() {
        let mut trace = Trace::new();
        let t = VirtualClock::from_parts(1, 0);
        trace.record(
            t,
            TraceKind::Generated {
                pid: SimPid(0),
                priority: 0,
            },
        );
        trace.record(
            t,
            TraceKind::Dispatched {
                pid: SimPid(0),
                priority: 0,
                quantum_ns: 100,
            },
        );
        trace.record(t, TraceKind::Terminated { pid: SimPid(0) });

        assert_eq!(trace.generated_count(), 1);
        assert_eq!(trace.dispatch_count(SimPid(0)), 1);
        assert_eq!(trace.dispatch_count(SimPid(1)), 0);
        assert_eq!(trace.total_dispatches(), 1);
        assert!(trace.terminated(SimPid(0)));
        assert_eq!(trace.terminated_count(), 1);
        assert_eq!(trace.final_clock(), Some(t));
    }
}
