//! Newtype wrappers and type aliases for domain concepts.
//!
//! Identifiers get newtypes to prevent silent confusion between a simulated
//! PID and, say, a queue level. Plain quantities (burst lengths, quanta)
//! stay as a nanosecond alias.

use std::fmt;

/// Simulated process identifier, unique among currently-live processes.
///
/// Valid values are `[0, max_live_processes)`; the [`crate::PidAllocator`]
/// owns the pool and hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimPid(pub u32);

impl fmt::Display for SimPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Simulated time span in nanoseconds.
pub type TimeNs = u64;
