//! A reusable rendezvous point for a fixed number of threads.

use std::sync::Arc;

use crate::sync::condvar::CondVar;
use crate::sync::lock::Lock;
use crate::threads::{Scheduler, ThreadId};

pub struct Barrier {
    parties: usize,
    lock: Lock,
    cond: CondVar,
    arrived: std::sync::Mutex<usize>,
}

impl Barrier {
    pub fn new(name: impl Into<String>, parties: usize, scheduler: Arc<Scheduler>) -> Self {
        let name = name.into();
        Self {
            parties,
            lock: Lock::new(format!("{name}.lock"), Arc::clone(&scheduler)),
            cond: CondVar::new(scheduler),
            arrived: std::sync::Mutex::new(0),
        }
    }

    /// Blocks until `parties` threads have called `wait`, then releases all
    /// of them together and resets the counter for the next round.
    pub fn wait(&self, tid: ThreadId) {
        self.lock.acquire(tid);
        let mut count = self.arrived.lock().unwrap();
        *count += 1;
        if *count == self.parties {
            *count = 0;
            drop(count);
            self.cond.broadcast(tid);
        } else {
            drop(count);
            self.cond.wait(tid, &self.lock);
        }
        self.lock.release(tid);
    }
}
