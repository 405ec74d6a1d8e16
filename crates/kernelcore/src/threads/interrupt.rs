//! The interrupt-level primitive: the kernel's sole atomicity tool.
//!
//! `set_level(Disabled)` / `set_level(Enabled)` bracket critical sections.
//! Re-enabling interrupts may deliver a timer tick that arrived while they
//! were disabled, which in turn may preempt the calling thread. There is no
//! real parallelism behind this: the scheduler's internal mutex already
//! gives mutual exclusion, so this flag is a faithful logical layer over
//! that mutex rather than the thing providing exclusion itself.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Enabled,
    Disabled,
}

/// Returned by `Scheduler::set_level`; restores the previous level on drop
/// the way source code bracketed `(disabled); ...; (previous)` by hand.
pub struct InterruptGuard<'a> {
    pub(super) scheduler: &'a super::scheduler::Scheduler,
    pub(super) tid: super::thread::ThreadId,
    pub(super) previous: Level,
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.set_level(self.tid, self.previous);
    }
}
