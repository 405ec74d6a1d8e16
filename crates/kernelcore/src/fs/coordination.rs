//! Tracks which file-header sectors are currently open, with a
//! reader-writer lock per sector so concurrent opens of the same file
//! coordinate correctly. Ported from `fileManager.cc`'s sector-keyed list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::sync::RwLock;
use crate::threads::{Scheduler, ThreadId};

struct Entry {
    refcount: Mutex<usize>,
    lock: RwLock,
}

pub struct OpenFileTable {
    entries: Mutex<HashMap<usize, Arc<Entry>>>,
    scheduler: Arc<Scheduler>,
}

impl OpenFileTable {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), scheduler }
    }

    /// Registers one more opener of `sector`, creating its coordination
    /// entry on first open.
    pub fn open(&self, sector: usize) {
        let mut entries = self.entries.lock().unwrap();
        let scheduler = Arc::clone(&self.scheduler);
        let entry = entries
            .entry(sector)
            .or_insert_with(|| Arc::new(Entry { refcount: Mutex::new(0), lock: RwLock::new(format!("openfile.{sector}"), scheduler) }));
        *entry.refcount.lock().unwrap() += 1;
    }

    /// Unregisters one opener, removing the entry once nobody still has it
    /// open. Returns `false` if `sector` was not tracked (a double-close).
    pub fn close(&self, sector: usize) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(&sector).cloned() else { return false };
        let mut refcount = entry.refcount.lock().unwrap();
        *refcount -= 1;
        if *refcount == 0 {
            drop(refcount);
            entries.remove(&sector);
        }
        true
    }

    pub fn refcount(&self, sector: usize) -> usize {
        self.entries.lock().unwrap().get(&sector).map(|e| *e.refcount.lock().unwrap()).unwrap_or(0)
    }

    fn entry(&self, sector: usize) -> Option<Arc<Entry>> {
        self.entries.lock().unwrap().get(&sector).cloned()
    }

    /// Each of these releases the table-wide lock before (possibly)
    /// blocking on the per-sector lock, so one thread's wait for a
    /// contended file never stalls lookups for every other open file.
    pub fn lock_read(&self, sector: usize, tid: ThreadId) {
        if let Some(entry) = self.entry(sector) {
            entry.lock.read_acquire(tid);
        }
    }

    pub fn release_read(&self, sector: usize, tid: ThreadId) {
        if let Some(entry) = self.entry(sector) {
            entry.lock.read_release(tid);
        }
    }

    pub fn lock_write(&self, sector: usize, tid: ThreadId) {
        if let Some(entry) = self.entry(sector) {
            entry.lock.write_acquire(tid);
        }
    }

    pub fn release_write(&self, sector: usize, tid: ThreadId) {
        if let Some(entry) = self.entry(sector) {
            entry.lock.write_release(tid);
        }
    }
}
