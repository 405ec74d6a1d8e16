//! Reader-writer lock: unbounded concurrent readers, one exclusive writer.
//!
//! Readers share a `writing` lock among themselves: the first reader in
//! acquires it on readers' behalf, blocking writers, and the last reader out
//! releases it. This is reader-preferring, so a steady stream of readers can
//! starve a waiting writer; that tradeoff is inherited rather than fixed.

use std::sync::Arc;

use crate::sync::lock::Lock;
use crate::threads::{Scheduler, ThreadId};

pub struct RwLock {
    mutex: Lock,
    writing: Lock,
    reader_count: std::sync::Mutex<usize>,
}

impl RwLock {
    pub fn new(name: impl Into<String>, scheduler: Arc<Scheduler>) -> Self {
        let name = name.into();
        Self {
            mutex: Lock::new(format!("{name}.mutex"), Arc::clone(&scheduler)),
            writing: Lock::new(format!("{name}.writing"), scheduler),
            reader_count: std::sync::Mutex::new(0),
        }
    }

    pub fn read_acquire(&self, tid: ThreadId) {
        self.mutex.acquire(tid);
        let mut count = self.reader_count.lock().unwrap();
        *count += 1;
        if *count == 1 {
            self.writing.acquire(tid);
        }
        drop(count);
        self.mutex.release(tid);
    }

    pub fn read_release(&self, tid: ThreadId) {
        self.mutex.acquire(tid);
        let mut count = self.reader_count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.writing.release(tid);
        }
        drop(count);
        self.mutex.release(tid);
    }

    pub fn write_acquire(&self, tid: ThreadId) {
        self.writing.acquire(tid);
    }

    pub fn write_release(&self, tid: ThreadId) {
        self.writing.release(tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;

    #[test]
    fn concurrent_readers_exclude_a_writer() {
        let scheduler = Scheduler::new(KernelConfig::default());
        let main = scheduler.bootstrap_main_thread("main");
        let rw = RwLock::new("test", Arc::clone(&scheduler));
        rw.read_acquire(main);
        rw.read_acquire(main);
        assert_eq!(*rw.reader_count.lock().unwrap(), 2);
        rw.read_release(main);
        rw.read_release(main);
        assert_eq!(*rw.reader_count.lock().unwrap(), 0);
        rw.write_acquire(main);
        rw.write_release(main);
    }
}
