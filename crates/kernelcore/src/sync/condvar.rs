//! Mesa-semantics condition variable.
//!
//! A woken waiter is only made ready to run again; it must re-acquire the
//! associated lock and re-check its condition in a loop, exactly as Mesa
//! monitors require (unlike Hoare semantics, a signal is a hint, not a
//! guarantee the condition still holds by the time the waiter runs).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::sync::lock::Lock;
use crate::threads::{Scheduler, ThreadId};

pub struct CondVar {
    scheduler: Arc<Scheduler>,
    waiters: Mutex<VecDeque<ThreadId>>,
}

impl CondVar {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler, waiters: Mutex::new(VecDeque::new()) }
    }

    /// Releases `lock`, blocks until signalled, then reacquires `lock`.
    ///
    /// Callers must hold `lock` and must re-check their condition after
    /// this returns.
    pub fn wait(&self, tid: ThreadId, lock: &Lock) {
        assert!(lock.is_held_by(tid), "{tid} waited without holding the lock");
        self.waiters.lock().unwrap().push_back(tid);
        lock.release(tid);
        self.scheduler.sleep(tid);
        lock.acquire(tid);
    }

    /// Wakes one waiter, if any.
    pub fn signal(&self, _tid: ThreadId) {
        if let Some(waiter) = self.waiters.lock().unwrap().pop_front() {
            self.scheduler.ready_to_run(waiter);
        }
    }

    /// Wakes every current waiter.
    pub fn broadcast(&self, _tid: ThreadId) {
        let drained: Vec<_> = self.waiters.lock().unwrap().drain(..).collect();
        for waiter in drained {
            self.scheduler.ready_to_run(waiter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn signal_wakes_a_single_waiter() {
        let scheduler = Scheduler::new(KernelConfig::default());
        let main = scheduler.bootstrap_main_thread("main");
        let lock = Arc::new(Lock::new("test", Arc::clone(&scheduler)));
        let cv = Arc::new(CondVar::new(Arc::clone(&scheduler)));
        let ran = Arc::new(AtomicBool::new(false));

        let (lock2, cv2, ran2) = (Arc::clone(&lock), Arc::clone(&cv), Arc::clone(&ran));
        let waiter = scheduler
            .fork("waiter", 0, move |_sched, tid| {
                lock2.acquire(tid);
                cv2.wait(tid, &lock2);
                ran2.store(true, Ordering::SeqCst);
                lock2.release(tid);
            })
            .unwrap();

        lock.acquire(main);
        cv.signal(main);
        lock.release(main);
        scheduler.join(main, waiter);
        scheduler.join_os_threads();
        assert!(ran.load(Ordering::SeqCst));
    }
}
