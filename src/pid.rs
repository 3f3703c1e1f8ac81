//! Simulated PID allocation.
//!
//! A fixed-capacity bitset tracks which simulated PIDs are live. Allocation
//! scans round-robin from the last reservation with wraparound: a released
//! PID becomes eligible again in scan order, not ahead of it.

use bitvec::prelude::*;

use crate::types::SimPid;

/// Owner of the bounded simulated-PID pool.
#[derive(Debug, Clone)]
pub struct PidAllocator {
    reserved: BitVec<u64, Lsb0>,
    /// Slot where the next scan starts; left at the last reserved slot.
    candidate: usize,
    live: usize,
}

impl PidAllocator {
    /// A pool of `capacity` PIDs, all free.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pid pool capacity must be nonzero");
        PidAllocator {
            reserved: bitvec![u64, Lsb0; 0; capacity],
            candidate: 0,
            live: 0,
        }
    }

    /// Reserve the next free PID in scan order, or `None` when the pool is
    /// exhausted. Exhaustion is recoverable: the caller defers whatever
    /// needed the PID.
    pub fn reserve_next(&mut self) -> Option<SimPid> {
        if self.live == self.reserved.len() {
            return None;
        }
        let capacity = self.reserved.len();
        let mut slot = self.candidate;
        while self.reserved[slot] {
            slot = (slot + 1) % capacity;
        }
        self.reserved.set(slot, true);
        self.candidate = slot;
        self.live += 1;
        Some(SimPid(slot as u32))
    }

    /// Return a PID to the pool. Double-release is a caller error; the
    /// allocator does not track ownership beyond the bit itself.
    pub fn release(&mut self, pid: SimPid) {
        let slot = pid.0 as usize;
        debug_assert!(self.reserved[slot], "release of unreserved pid {pid}");
        self.reserved.set(slot, false);
        self.live -= 1;
    }

    pub fn is_reserved(&self, pid: SimPid) -> bool {
        self.reserved
            .get(pid.0 as usize)
            .is_some_and(|bit| *bit)
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn capacity(&self) -> usize {
        self.reserved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserves_ascending_from_empty() {
        let mut pool = PidAllocator::new(4);
        for expected in 0..4 {
            assert_eq!(pool.reserve_next(), Some(SimPid(expected)));
        }
        assert_eq!(pool.reserve_next(), None);
        assert_eq!(pool.live_count(), 4);
    }

    #[test]
    fn test_release_makes_pid_eligible_in_scan_order() {
        let mut pool = PidAllocator::new(4);
        for _ in 0..4 {
            pool.reserve_next();
        }
        pool.release(SimPid(1));
        // Scan resumes from the last reservation (slot 3) and wraps.
        assert_eq!(pool.reserve_next(), Some(SimPid(1)));
        assert_eq!(pool.reserve_next(), None);
    }

    #[test]
    fn test_never_returns_live_pid() {
        let mut pool = PidAllocator::new(8);
        let mut live = Vec::new();
        for _ in 0..8 {
            live.push(pool.reserve_next().unwrap());
        }
        pool.release(SimPid(2));
        pool.release(SimPid(5));
        let a = pool.reserve_next().unwrap();
        let b = pool.reserve_next().unwrap();
        assert_ne!(a, b);
        assert!(a == SimPid(2) || a == SimPid(5));
        assert!(b == SimPid(2) || b == SimPid(5));
        assert_eq!(pool.reserve_next(), None);
    }

    #[test]
    fn test_is_reserved_tracks_state() {
        let mut pool = PidAllocator::new(2);
        let pid = pool.reserve_next().unwrap();
        assert!(pool.is_reserved(pid));
        pool.release(pid);
        assert!(!pool.is_reserved(pid));
        // Out-of-range pids are simply not reserved.
        assert!(!pool.is_reserved(SimPid(99)));
    }

    #[test]
    fn test_exhaust_release_exhaust() {
        let mut pool = PidAllocator::new(3);
        for _ in 0..3 {
            pool.reserve_next();
        }
        assert_eq!(pool.reserve_next(), None);
        pool.release(SimPid(0));
        assert_eq!(pool.reserve_next(), Some(SimPid(0)));
        assert_eq!(pool.reserve_next(), None);
    }
}
