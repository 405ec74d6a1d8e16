//! Mutual-exclusion lock with ownership tracking.

use std::sync::Arc;

use crate::sync::semaphore::Semaphore;
use crate::threads::{Scheduler, ThreadId};

pub struct Lock {
    name: String,
    semaphore: Semaphore,
    owner: std::sync::Mutex<Option<ThreadId>>,
}

impl Lock {
    pub fn new(name: impl Into<String>, scheduler: Arc<Scheduler>) -> Self {
        let name = name.into();
        Self {
            semaphore: Semaphore::new(format!("{name}.sem"), 1, scheduler),
            name,
            owner: std::sync::Mutex::new(None),
        }
    }

    pub fn acquire(&self, tid: ThreadId) {
        assert!(
            !self.is_held_by(tid),
            "{tid} attempted to acquire lock {} it already holds",
            self.name
        );
        self.semaphore.p(tid);
        *self.owner.lock().unwrap() = Some(tid);
    }

    pub fn release(&self, tid: ThreadId) {
        assert!(
            self.is_held_by(tid),
            "{tid} released lock {} it does not hold",
            self.name
        );
        *self.owner.lock().unwrap() = None;
        self.semaphore.v(tid);
    }

    pub fn is_held_by(&self, tid: ThreadId) -> bool {
        *self.owner.lock().unwrap() == Some(tid)
    }

    pub fn is_held(&self) -> bool {
        self.owner.lock().unwrap().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;

    #[test]
    fn acquire_then_release_clears_ownership() {
        let scheduler = Scheduler::new(KernelConfig::default());
        let tid = scheduler.bootstrap_main_thread("main");
        let lock = Lock::new("test", Arc::clone(&scheduler));
        lock.acquire(tid);
        assert!(lock.is_held_by(tid));
        lock.release(tid);
        assert!(!lock.is_held());
    }

    #[test]
    #[should_panic(expected = "already holds")]
    fn double_acquire_by_same_thread_panics() {
        let scheduler = Scheduler::new(KernelConfig::default());
        let tid = scheduler.bootstrap_main_thread("main");
        let lock = Lock::new("test", Arc::clone(&scheduler));
        lock.acquire(tid);
        lock.acquire(tid);
    }
}
