//! Process control blocks and the lifecycle state machine.
//!
//! One PCB exists per live simulated process, owned by value by whichever
//! queue currently holds it — or by the engine's dispatch context while the
//! process is Running. State changes go through [`ProcessControlBlock::transition`],
//! which rejects anything outside the legal lifecycle.

use anyhow::{bail, Result};

use crate::clock::VirtualClock;
use crate::types::SimPid;

/// Lifecycle state of a simulated process.
///
/// Legal transitions: `New → Ready → Running → {Ready, Blocked, Exit}` and
/// `Blocked → Ready`. A preempted process goes back to Ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    New,
    Ready,
    Running,
    Blocked,
    Exit,
}

/// Whether a process is subject to priority demotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingClass {
    Normal,
    /// Always scheduled at the highest priority level.
    RealTime,
}

/// The scheduler's record of one simulated process.
#[derive(Debug, Clone)]
pub struct ProcessControlBlock {
    sim_pid: SimPid,
    scheduling_class: SchedulingClass,
    state: ProcessState,
    /// Ready-queue level, `0..num_levels`; 0 is the highest priority.
    pub priority: usize,
    pub time_created: VirtualClock,
    pub time_of_last_burst: VirtualClock,
    pub time_used_during_last_burst: VirtualClock,
    pub total_cpu_time: VirtualClock,
    pub next_io_event_time: VirtualClock,
}

impl ProcessControlBlock {
    /// A fresh PCB in the `New` state with zeroed burst bookkeeping.
    pub fn new(
        sim_pid: SimPid,
        scheduling_class: SchedulingClass,
        time_created: VirtualClock,
    ) -> Self {
        ProcessControlBlock {
            sim_pid,
            scheduling_class,
            state: ProcessState::New,
            priority: 0,
            time_created,
            time_of_last_burst: VirtualClock::zero(),
            time_used_during_last_burst: VirtualClock::zero(),
            total_cpu_time: VirtualClock::zero(),
            next_io_event_time: VirtualClock::zero(),
        }
    }

    pub fn sim_pid(&self) -> SimPid {
        self.sim_pid
    }

    pub fn scheduling_class(&self) -> SchedulingClass {
        self.scheduling_class
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Move to `to`, or fail if the lifecycle does not allow it. An illegal
    /// transition means caller discipline broke down and is fatal to the run.
    pub fn transition(&mut self, to: ProcessState) -> Result<()> {
        use ProcessState::*;
        let legal = matches!(
            (self.state, to),
            (New, Ready)
                | (Ready, Running)
                | (Running, Ready)
                | (Running, Blocked)
                | (Running, Exit)
                | (Blocked, Ready)
        );
        if !legal {
            bail!(
                "invalid state transition {:?} -> {:?} for pid {}",
                self.state,
                to,
                self.sim_pid
            );
        }
        self.state = to;
        Ok(())
    }

    /// When the process last held the CPU: start of its last burst plus the
    /// time it used during that burst.
    pub fn time_last_executing(&self) -> VirtualClock {
        VirtualClock::sum(self.time_of_last_burst, self.time_used_during_last_burst)
    }

    /// Elapsed time since the process was created.
    pub fn time_in_system(&self, now: VirtualClock) -> Result<VirtualClock> {
        now.duration_since(self.time_created)
    }

    /// Fraction of its lifetime the process has spent on the CPU. Zero when
    /// it has been in the system for no time at all.
    pub fn cpu_utilization(&self, now: VirtualClock) -> Result<f64> {
        let in_system = self.time_in_system(now)?;
        if in_system.is_zero() {
            return Ok(0.0);
        }
        self.total_cpu_time.ratio(in_system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcb() -> ProcessControlBlock {
        ProcessControlBlock::new(
            SimPid(3),
            SchedulingClass::Normal,
            VirtualClock::from_parts(1, 0),
        )
    }

    #[test]
    fn test_full_lifecycle() {
        let mut p = pcb();
        assert_eq!(p.state(), ProcessState::New);
        p.transition(ProcessState::Ready).unwrap();
        p.transition(ProcessState::Running).unwrap();
        p.transition(ProcessState::Blocked).unwrap();
        p.transition(ProcessState::Ready).unwrap();
        p.transition(ProcessState::Running).unwrap();
        p.transition(ProcessState::Exit).unwrap();
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut p = pcb();
        assert!(p.transition(ProcessState::Running).is_err());
        assert!(p.transition(ProcessState::Blocked).is_err());
        assert!(p.transition(ProcessState::Exit).is_err());

        p.transition(ProcessState::Ready).unwrap();
        assert!(p.transition(ProcessState::Blocked).is_err());
        assert!(p.transition(ProcessState::New).is_err());

        p.transition(ProcessState::Running).unwrap();
        p.transition(ProcessState::Exit).unwrap();
        assert!(p.transition(ProcessState::Ready).is_err());
    }

    #[test]
    fn test_transition_error_names_pid() {
        let mut p = pcb();
        let err = p.transition(ProcessState::Exit).unwrap_err();
        assert!(err.to_string().contains("03"), "diagnostic: {err}");
    }

    #[test]
    fn test_time_last_executing() {
        let mut p = pcb();
        p.time_of_last_burst = VirtualClock::from_parts(5, 900_000_000);
        p.time_used_during_last_burst = VirtualClock::from_parts(0, 200_000_000);
        assert_eq!(
            p.time_last_executing(),
            VirtualClock::from_parts(6, 100_000_000)
        );
    }

    #[test]
    fn test_cpu_utilization() {
        let mut p = pcb();
        // Created at t=1s; no time in system yet.
        assert_eq!(
            p.cpu_utilization(VirtualClock::from_parts(1, 0)).unwrap(),
            0.0
        );
        p.total_cpu_time = VirtualClock::from_parts(1, 0);
        let util = p.cpu_utilization(VirtualClock::from_parts(5, 0)).unwrap();
        assert_eq!(util, 0.25);
        // now earlier than creation is an arithmetic precondition failure.
        assert!(p.cpu_utilization(VirtualClock::zero()).is_err());
    }
}
