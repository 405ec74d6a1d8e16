//! Thread identity and per-thread bookkeeping.

use std::sync::Arc;

use crate::vm::address_space::AddressSpace;
use std::sync::Mutex;

/// Opaque thread identifier, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tid#{}", self.0)
    }
}

/// Lifecycle states from the component design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    New,
    Ready,
    Running,
    Blocked,
    Finished,
}

/// Everything the scheduler tracks about one thread besides its run state.
///
/// The "kernel stack" and "saved context" of the source design are the real
/// OS thread stack backing this entry; there is nothing to save explicitly
/// because a blocked kernel thread is a blocked native thread parked on a
/// condition variable, not a set of registers we swap by hand.
pub struct ThreadControlBlock {
    pub name: String,
    pub state: ThreadState,
    pub priority: i32,
    /// Shared with any other thread in the same process (address spaces may
    /// be shared among threads of one process). `None` for kernel-only
    /// threads with no user-mode address space.
    pub address_space: Option<Arc<Mutex<AddressSpace>>>,
    pub ticks_in_slice: u32,
}

impl ThreadControlBlock {
    pub fn new(name: String, priority: i32, address_space: Option<Arc<Mutex<AddressSpace>>>) -> Self {
        Self {
            name,
            state: ThreadState::New,
            priority,
            address_space,
            ticks_in_slice: 0,
        }
    }
}
