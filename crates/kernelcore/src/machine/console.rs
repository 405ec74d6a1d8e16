//! The simulated console device, and the synchronous wrapper threads
//! actually call through (`synchConsole.cc`'s pattern: a completion
//! semaphore turns the async device into a blocking call).

use std::sync::{Arc, Mutex};

use crate::sync::Semaphore;
use crate::threads::{Scheduler, ThreadId};

pub trait Console: Send + Sync {
    fn put_char(&self, ch: u8, done: Box<dyn FnOnce() + Send>);
    fn get_char(&self, done: Box<dyn FnOnce(u8) + Send>);
}

/// An in-memory console: writes accumulate into a buffer, reads drain a
/// pre-seeded input queue. Completion is immediate, which is enough for
/// scenario tests that don't care about timing.
pub struct InMemoryConsole {
    output: Mutex<Vec<u8>>,
    input: Mutex<std::collections::VecDeque<u8>>,
}

impl InMemoryConsole {
    pub fn new(input: impl IntoIterator<Item = u8>) -> Self {
        Self { output: Mutex::new(Vec::new()), input: Mutex::new(input.into_iter().collect()) }
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }
}

impl Console for InMemoryConsole {
    fn put_char(&self, ch: u8, done: Box<dyn FnOnce() + Send>) {
        self.output.lock().unwrap().push(ch);
        done();
    }

    fn get_char(&self, done: Box<dyn FnOnce(u8) + Send>) {
        let ch = self.input.lock().unwrap().pop_front().unwrap_or(0);
        done(ch);
    }
}

/// Blocking front-end over a [`Console`]: a syscall handler calls
/// `write`/`read` and gets control back only once the device signals
/// completion, via a one-shot semaphore exactly as `SynchConsole` does.
pub struct SynchConsole {
    device: Arc<dyn Console>,
    scheduler: Arc<Scheduler>,
}

impl SynchConsole {
    pub fn new(device: Arc<dyn Console>, scheduler: Arc<Scheduler>) -> Self {
        Self { device, scheduler }
    }

    /// Blocks `tid` until the underlying device signals completion. Safe to
    /// call only from `tid`'s own turnstile slot: the completion callback
    /// runs either synchronously (zero-latency devices) or on whichever
    /// thread the device chooses, and in both cases it is `tid` itself that
    /// is parked on `done` waiting to be posted.
    pub fn write(&self, tid: ThreadId, ch: u8) {
        let done = Arc::new(Semaphore::new("console.write.done", 0, Arc::clone(&self.scheduler)));
        let done_clone = Arc::clone(&done);
        self.device.put_char(ch, Box::new(move || done_clone.v(tid)));
        done.p(tid);
    }

    pub fn read(&self, tid: ThreadId) -> u8 {
        let result = Arc::new(Mutex::new(0u8));
        let done = Arc::new(Semaphore::new("console.read.done", 0, Arc::clone(&self.scheduler)));
        let (result_clone, done_clone) = (Arc::clone(&result), Arc::clone(&done));
        self.device.get_char(Box::new(move |ch| {
            *result_clone.lock().unwrap() = ch;
            done_clone.v(tid);
        }));
        done.p(tid);
        *result.lock().unwrap()
    }
}
