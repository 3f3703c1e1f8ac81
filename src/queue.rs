//! Multi-level feedback queue of process control blocks.
//!
//! `num_levels` FIFO ready lists (index 0 = highest priority) plus one
//! blocked list kept sorted ascending by next-I/O-event time. The queue owns
//! its PCBs by value: a block lives in exactly one list at a time, and
//! dequeueing transfers ownership to the caller. Demotion happens on the way
//! in (every non-terminal CPU use costs one level), promotion happens on the
//! way out (head-only aging before each dequeue).

use std::collections::VecDeque;

use anyhow::{bail, Result};
use tracing::debug;

use crate::clock::VirtualClock;
use crate::config::AgingConfig;
use crate::pcb::{ProcessControlBlock, ProcessState, SchedulingClass};
use crate::types::SimPid;

/// One blocked process brought back to ready, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeRecord {
    pub pid: SimPid,
    /// Ready level the process landed in.
    pub priority: usize,
    /// Clock value after charging this wake-up's overhead.
    pub at: VirtualClock,
}

/// The multi-level feedback queue.
#[derive(Debug)]
pub struct FeedbackQueue {
    ready: Vec<VecDeque<ProcessControlBlock>>,
    /// Sorted ascending by `next_io_event_time`; index 0 wakes first.
    blocked: Vec<ProcessControlBlock>,
    aging: AgingConfig,
    wake_increment: VirtualClock,
}

impl FeedbackQueue {
    pub fn new(num_levels: usize, aging: AgingConfig, wake_increment: VirtualClock) -> Self {
        assert!(num_levels > 0, "feedback queue needs at least one level");
        assert!(
            aging.cutoff_level > 0,
            "aging cutoff must leave a level to promote into"
        );
        FeedbackQueue {
            ready: (0..num_levels).map(|_| VecDeque::new()).collect(),
            blocked: Vec::new(),
            aging,
            wake_increment,
        }
    }

    pub fn num_levels(&self) -> usize {
        self.ready.len()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.iter().map(VecDeque::len).sum()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    /// Total PCBs held across every ready level and the blocked list.
    pub fn count(&self) -> usize {
        self.ready_count() + self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Occupancy of one ready level.
    pub fn level_len(&self, level: usize) -> usize {
        self.ready[level].len()
    }

    /// Add a PCB to the ready structure, adjusting its priority first:
    /// real-time and brand-new processes go to level 0; everything else is
    /// demoted one level (capped at the bottom). A `New` block becomes
    /// `Ready` as part of its initial enqueue. Returns the level used.
    pub fn enqueue_ready(&mut self, mut pcb: ProcessControlBlock) -> Result<usize> {
        let is_new = pcb.state() == ProcessState::New;
        if is_new || pcb.scheduling_class() == SchedulingClass::RealTime {
            pcb.priority = 0;
        } else if pcb.priority + 1 < self.ready.len() {
            pcb.priority += 1;
        }
        if is_new {
            pcb.transition(ProcessState::Ready)?;
        } else if pcb.state() != ProcessState::Ready {
            bail!(
                "enqueue_ready for pid {} in state {:?}",
                pcb.sim_pid(),
                pcb.state()
            );
        }
        let level = pcb.priority;
        self.ready[level].push_back(pcb);
        Ok(level)
    }

    /// Add a blocked PCB, recording when its I/O completes. Insertion keeps
    /// the blocked list sorted ascending by wake time, ties broken by
    /// arrival order.
    pub fn enqueue_blocked(
        &mut self,
        mut pcb: ProcessControlBlock,
        wake_time: VirtualClock,
    ) -> Result<()> {
        if pcb.state() != ProcessState::Blocked {
            bail!(
                "enqueue_blocked for pid {} in state {:?}",
                pcb.sim_pid(),
                pcb.state()
            );
        }
        pcb.next_io_event_time = wake_time;
        let at = self
            .blocked
            .iter()
            .position(|other| other.next_io_event_time > wake_time)
            .unwrap_or(self.blocked.len());
        self.blocked.insert(at, pcb);
        Ok(())
    }

    /// Remove and return the head of the highest-priority non-empty ready
    /// level, promoting sufficiently-aged processes first. Calling this with
    /// an empty ready structure is a caller error, not a normal outcome.
    pub fn dequeue_ready(&mut self, now: VirtualClock) -> Result<ProcessControlBlock> {
        self.promote_aged(now)?;
        for level in 0..self.ready.len() {
            if let Some(pcb) = self.ready[level].pop_front() {
                return Ok(pcb);
            }
        }
        bail!("dequeue_ready called with no process in any ready queue");
    }

    /// Return a preempted PCB to the head of its current level, priority
    /// unchanged — it did not consume its quantum, so it does not pay the
    /// demotion.
    pub fn requeue_at_front(&mut self, pcb: ProcessControlBlock) {
        debug_assert_eq!(pcb.state(), ProcessState::Ready);
        let level = pcb.priority;
        self.ready[level].push_front(pcb);
    }

    /// Wake every blocked process whose I/O event time has been reached,
    /// moving each to the tail of the ready level matching its priority.
    /// Each wake-up charges the configured overhead to `now`, modeling
    /// interrupt-handling cost; the advanced clock is compared against the
    /// remaining blocked heads, so one sweep drains everything due.
    /// Repeating the call with an unchanged clock is a no-op.
    pub fn wake_due(&mut self, now: &mut VirtualClock) -> Result<Vec<WakeRecord>> {
        let mut woken = Vec::new();
        while self
            .blocked
            .first()
            .is_some_and(|pcb| pcb.next_io_event_time <= *now)
        {
            let mut pcb = self.blocked.remove(0);
            pcb.transition(ProcessState::Ready)?;
            now.advance(self.wake_increment);
            let level = pcb.priority;
            woken.push(WakeRecord {
                pid: pcb.sim_pid(),
                priority: level,
                at: *now,
            });
            self.ready[level].push_back(pcb);
        }
        Ok(woken)
    }

    /// Head-only aging pass: for each level at or below the cutoff, promote
    /// the head one level if it is CPU-light (utilization under
    /// `util_scale / count`) and has waited past the threshold. Only heads
    /// are examined, so a pass is O(num_levels), not a full-queue scan.
    fn promote_aged(&mut self, now: VirtualClock) -> Result<()> {
        let count = self.count();
        if count == 0 {
            return Ok(());
        }
        let util_threshold = self.aging.util_scale / count as f64;
        for level in self.aging.cutoff_level..self.ready.len() {
            let promote = {
                let Some(head) = self.ready[level].front() else {
                    continue;
                };
                let waited = now.duration_since(head.time_last_executing())?;
                head.cpu_utilization(now)? < util_threshold
                    && waited >= self.aging.wait_threshold
            };
            if promote {
                if let Some(mut pcb) = self.ready[level].pop_front() {
                    pcb.priority -= 1;
                    debug!(pid = %pcb.sim_pid(), from = level, to = level - 1, "aged promotion");
                    self.ready[level - 1].push_front(pcb);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgingConfig;

    fn queue() -> FeedbackQueue {
        FeedbackQueue::new(
            4,
            AgingConfig::default(),
            VirtualClock::from_parts(0, 1_000),
        )
    }

    fn new_pcb(pid: u32, class: SchedulingClass) -> ProcessControlBlock {
        ProcessControlBlock::new(SimPid(pid), class, VirtualClock::zero())
    }

    /// Walk a PCB through one dispatch so it is Ready at a real priority.
    fn after_burst(q: &mut FeedbackQueue, now: VirtualClock) -> ProcessControlBlock {
        let mut pcb = q.dequeue_ready(now).unwrap();
        pcb.transition(ProcessState::Running).unwrap();
        pcb.transition(ProcessState::Ready).unwrap();
        pcb
    }

    #[test]
    fn test_new_process_lands_at_top() {
        let mut q = queue();
        let level = q.enqueue_ready(new_pcb(0, SchedulingClass::Normal)).unwrap();
        assert_eq!(level, 0);
        assert_eq!(q.ready_count(), 1);
    }

    #[test]
    fn test_demotion_caps_at_bottom_level() {
        let mut q = queue();
        q.enqueue_ready(new_pcb(0, SchedulingClass::Normal)).unwrap();
        let now = VirtualClock::from_parts(0, 1);
        for expected in [1, 2, 3, 3, 3] {
            let pcb = after_burst(&mut q, now);
            let level = q.enqueue_ready(pcb).unwrap();
            assert_eq!(level, expected);
        }
    }

    #[test]
    fn test_real_time_always_priority_zero() {
        let mut q = queue();
        q.enqueue_ready(new_pcb(0, SchedulingClass::RealTime)).unwrap();
        let now = VirtualClock::from_parts(0, 1);
        for _ in 0..3 {
            let pcb = after_burst(&mut q, now);
            let level = q.enqueue_ready(pcb).unwrap();
            assert_eq!(level, 0);
        }
    }

    #[test]
    fn test_dequeue_order_by_priority_then_fifo() {
        let mut q = queue();
        // Three processes: demote two of them to level 1, keep one at 0.
        for pid in 0..3 {
            q.enqueue_ready(new_pcb(pid, SchedulingClass::Normal)).unwrap();
        }
        let now = VirtualClock::from_parts(0, 1);
        // pids 0 and 1 burn a burst each and drop to level 1.
        for _ in 0..2 {
            let pcb = after_burst(&mut q, now);
            q.enqueue_ready(pcb).unwrap();
        }
        // Priority 0 head first, then level 1 in FIFO order.
        let order: Vec<u32> = (0..3)
            .map(|_| q.dequeue_ready(now).unwrap().sim_pid().0)
            .collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_dequeue_empty_is_error() {
        let mut q = queue();
        let err = q.dequeue_ready(VirtualClock::zero()).unwrap_err();
        assert!(err.to_string().contains("no process"), "diagnostic: {err}");
    }

    #[test]
    fn test_blocked_list_stays_sorted() {
        let mut q = queue();
        let wakes = [7u32, 2, 9, 2, 5];
        for (pid, wake_secs) in wakes.iter().enumerate() {
            q.enqueue_ready(new_pcb(pid as u32, SchedulingClass::Normal))
                .unwrap();
            let mut pcb = q.dequeue_ready(VirtualClock::zero()).unwrap();
            pcb.transition(ProcessState::Running).unwrap();
            pcb.transition(ProcessState::Blocked).unwrap();
            q.enqueue_blocked(pcb, VirtualClock::from_parts(*wake_secs, 0))
                .unwrap();
        }
        let times: Vec<u32> = q.blocked.iter().map(|p| p.next_io_event_time.seconds()).collect();
        assert_eq!(times, vec![2, 2, 5, 7, 9]);
        // The two ties keep arrival order: pid 1 blocked before pid 3.
        assert_eq!(q.blocked[0].sim_pid(), SimPid(1));
        assert_eq!(q.blocked[1].sim_pid(), SimPid(3));
    }

    #[test]
    fn test_wake_due_moves_exactly_the_due() {
        let mut q = queue();
        for (pid, wake_secs) in [(0u32, 1u32), (1, 2), (2, 10)] {
            q.enqueue_ready(new_pcb(pid, SchedulingClass::Normal)).unwrap();
            let mut pcb = q.dequeue_ready(VirtualClock::zero()).unwrap();
            pcb.transition(ProcessState::Running).unwrap();
            pcb.transition(ProcessState::Blocked).unwrap();
            q.enqueue_blocked(pcb, VirtualClock::from_parts(wake_secs, 0))
                .unwrap();
        }
        let mut now = VirtualClock::from_parts(5, 0);
        let woken = q.wake_due(&mut now).unwrap();
        assert_eq!(woken.len(), 2);
        assert_eq!(woken[0].pid, SimPid(0));
        assert_eq!(woken[1].pid, SimPid(1));
        assert_eq!(q.blocked_count(), 1);
        assert_eq!(q.ready_count(), 2);
        // Overhead charged once per wake.
        assert_eq!(now, VirtualClock::from_parts(5, 2_000));

        // Unchanged clock: second sweep is a no-op.
        let again = q.wake_due(&mut now).unwrap();
        assert!(again.is_empty());
        assert_eq!(now, VirtualClock::from_parts(5, 2_000));
    }

    #[test]
    fn test_woken_process_keeps_its_priority() {
        let mut q = queue();
        q.enqueue_ready(new_pcb(0, SchedulingClass::Normal)).unwrap();
        let now = VirtualClock::from_parts(0, 1);
        // One full burst: demoted to level 1 on re-enqueue.
        let pcb = after_burst(&mut q, now);
        q.enqueue_ready(pcb).unwrap();
        // Then it blocks from level 1.
        let mut pcb = q.dequeue_ready(now).unwrap();
        pcb.transition(ProcessState::Running).unwrap();
        pcb.transition(ProcessState::Blocked).unwrap();
        assert_eq!(pcb.priority, 1);
        q.enqueue_blocked(pcb, VirtualClock::from_parts(1, 0)).unwrap();

        let mut clock = VirtualClock::from_parts(2, 0);
        let woken = q.wake_due(&mut clock).unwrap();
        assert_eq!(woken[0].priority, 1);
        assert_eq!(q.level_len(1), 1);
        assert_eq!(q.level_len(0), 0);
    }

    #[test]
    fn test_requeue_at_front() {
        let mut q = queue();
        q.enqueue_ready(new_pcb(0, SchedulingClass::Normal)).unwrap();
        q.enqueue_ready(new_pcb(1, SchedulingClass::Normal)).unwrap();
        let now = VirtualClock::from_parts(0, 1);
        let mut first = q.dequeue_ready(now).unwrap();
        assert_eq!(first.sim_pid(), SimPid(0));
        first.transition(ProcessState::Running).unwrap();
        first.transition(ProcessState::Ready).unwrap();
        q.requeue_at_front(first);
        // Preempted block is next out again, ahead of pid 1.
        assert_eq!(q.dequeue_ready(now).unwrap().sim_pid(), SimPid(0));
    }

    #[test]
    fn test_aging_promotes_starved_head_to_front() {
        let mut q = queue();
        // A CPU-heavy process pinned at level 2 and a starved one behind it
        // at level 3.
        q.enqueue_ready(new_pcb(0, SchedulingClass::Normal)).unwrap();
        q.enqueue_ready(new_pcb(1, SchedulingClass::Normal)).unwrap();
        let t = VirtualClock::from_parts(0, 1);
        for _ in 0..2 {
            let pcb = after_burst(&mut q, t);
            q.enqueue_ready(pcb).unwrap(); // -> level 1
        }
        for _ in 0..2 {
            let pcb = after_burst(&mut q, t);
            q.enqueue_ready(pcb).unwrap(); // -> level 2
        }
        // pid 0 drops once more to level 3.
        let pcb = after_burst(&mut q, t);
        q.enqueue_ready(pcb).unwrap();
        assert_eq!(q.level_len(2), 1);
        assert_eq!(q.level_len(3), 1);

        // Far in the future both heads are idle and CPU-light; the level 2
        // head is promoted to the front of level 1, the level 3 head to
        // level 2.
        let later = VirtualClock::from_parts(100, 0);
        let got = q.dequeue_ready(later).unwrap();
        assert_eq!(got.priority, 1);
        assert_eq!(got.sim_pid(), SimPid(1));
        // The survivor ages again on the next dequeue: 2 -> 1.
        let got = q.dequeue_ready(later).unwrap();
        assert_eq!(got.priority, 1);
        assert_eq!(got.sim_pid(), SimPid(0));
    }

    #[test]
    fn test_aging_respects_wait_threshold() {
        let mut q = queue();
        q.enqueue_ready(new_pcb(0, SchedulingClass::Normal)).unwrap();
        let t = VirtualClock::from_parts(0, 1);
        for _ in 0..2 {
            let pcb = after_burst(&mut q, t);
            q.enqueue_ready(pcb).unwrap();
        }
        assert_eq!(q.level_len(2), 1);
        // Dequeue almost immediately: below the wait threshold, stays put.
        let soon = VirtualClock::from_parts(0, 500);
        let got = q.dequeue_ready(soon).unwrap();
        assert_eq!(got.priority, 2);
    }
}
