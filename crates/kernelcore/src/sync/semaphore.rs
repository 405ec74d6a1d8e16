//! Counting semaphore: the primitive every other synchronization object is
//! built from.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::threads::{Scheduler, ThreadId};

struct Inner {
    value: i64,
    waiters: VecDeque<ThreadId>,
}

pub struct Semaphore {
    name: String,
    scheduler: Arc<Scheduler>,
    inner: Mutex<Inner>,
}

impl Semaphore {
    pub fn new(name: impl Into<String>, initial_value: i64, scheduler: Arc<Scheduler>) -> Self {
        Self {
            name: name.into(),
            scheduler,
            inner: Mutex::new(Inner { value: initial_value, waiters: VecDeque::new() }),
        }
    }

    /// Waits until `value > 0`, then decrements it.
    pub fn p(&self, tid: ThreadId) {
        let _guard = self.scheduler.disable_interrupts(tid);
        loop {
            let mut inner = self.inner.lock().unwrap();
            if inner.value > 0 {
                inner.value -= 1;
                trace!(sem = %self.name, %tid, value = inner.value, "P");
                return;
            }
            inner.waiters.push_back(tid);
            drop(inner);
            self.scheduler.sleep(tid);
        }
    }

    /// Increments `value`, waking one waiter if any were queued.
    pub fn v(&self, tid: ThreadId) {
        let _guard = self.scheduler.disable_interrupts(tid);
        let mut inner = self.inner.lock().unwrap();
        inner.value += 1;
        let woken = inner.waiters.pop_front();
        trace!(sem = %self.name, %tid, value = inner.value, ?woken, "V");
        drop(inner);
        if let Some(waiter) = woken {
            self.scheduler.ready_to_run(waiter);
        }
    }

    pub fn value(&self) -> i64 {
        self.inner.lock().unwrap().value
    }
}
