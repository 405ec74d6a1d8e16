//! Single-CPU cooperative thread scheduler.
//!
//! Every kernel thread is backed by a real OS thread, but only one of them
//! is ever allowed to run kernel code at a time: a forked OS thread parks
//! on `cond` immediately after it starts and does not proceed into the
//! user closure until the scheduler marks it `running`. `yield_`, `sleep`,
//! `finish`, and `ready_to_run` are the only ways `running` changes hands.
//! This turns real OS threads into the host-process equivalent of the
//! source system's user-level, `setjmp`/`longjmp`-switched kernel threads:
//! cooperative, single-CPU, no true parallelism.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, trace};

use super::interrupt::{InterruptGuard, Level};
use super::thread::{ThreadControlBlock, ThreadId, ThreadState};
use crate::config::KernelConfig;
use crate::error::SyscallError;

/// Preemption time slice, in simulated timer ticks.
const TIME_SLICE: u32 = 4;

struct Inner {
    threads: HashMap<ThreadId, ThreadControlBlock>,
    ready: VecDeque<(i32, u64, ThreadId)>,
    running: Option<ThreadId>,
    next_tid: u64,
    next_seq: u64,
    /// Threads blocked in `join(target)`, keyed by the target they wait on.
    joiners: HashMap<ThreadId, Vec<ThreadId>>,
    interrupts_enabled: bool,
    pending_preempt: bool,
    os_handles: Vec<JoinHandle<()>>,
    ticks: u64,
}

/// The process-wide kernel scheduler. Cheap to clone (it's an `Arc` handle).
pub struct Scheduler {
    inner: Mutex<Inner>,
    cond: Condvar,
    config: KernelConfig,
}

impl Scheduler {
    pub fn new(config: KernelConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                threads: HashMap::new(),
                ready: VecDeque::new(),
                running: None,
                next_tid: 0,
                next_seq: 0,
                joiners: HashMap::new(),
                interrupts_enabled: true,
                pending_preempt: false,
                os_handles: Vec::new(),
                ticks: 0,
            }),
            cond: Condvar::new(),
            config,
        })
    }

    /// Registers the calling OS thread (the process's real entry point, or
    /// a test's driver thread) as the initial running kernel thread and
    /// returns its id. Call exactly once per `Scheduler`.
    pub fn bootstrap_main_thread(&self, name: impl Into<String>) -> ThreadId {
        let mut inner = self.inner.lock().unwrap();
        let tid = ThreadId(inner.next_tid);
        inner.next_tid += 1;
        let mut tcb = ThreadControlBlock::new(name.into(), 0, None);
        tcb.state = ThreadState::Running;
        inner.threads.insert(tid, tcb);
        inner.running = Some(tid);
        debug!(%tid, "bootstrapped main kernel thread");
        tid
    }

    /// `fork(f, arg)`: enqueues a new ready thread and spawns the OS thread
    /// that will execute it once scheduled. Returns `TooManyThreads` if
    /// `MaxThreads` live threads already exist, per the component design's
    /// failure mode (thread creation fails, it does not abort the caller).
    pub fn fork<F>(self: &Arc<Self>, name: impl Into<String>, priority: i32, body: F) -> Result<ThreadId, SyscallError>
    where
        F: FnOnce(Arc<Scheduler>, ThreadId) + Send + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        if inner.threads.len() >= self.config.max_threads {
            return Err(SyscallError::TooManyThreads);
        }
        let tid = ThreadId(inner.next_tid);
        inner.next_tid += 1;
        let tcb = ThreadControlBlock::new(name.into(), priority, None);
        inner.threads.insert(tid, tcb);
        self.enqueue_ready_locked(&mut inner, tid, priority);
        drop(inner);

        let scheduler = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("kthread-{tid}"))
            .spawn(move || {
                scheduler.wait_for_turn(tid);
                body(Arc::clone(&scheduler), tid);
                scheduler.finish(tid);
            })
            .expect("spawn kernel thread");

        self.inner.lock().unwrap().os_handles.push(handle);
        debug!(%tid, "forked thread");
        Ok(tid)
    }

    fn enqueue_ready_locked(&self, inner: &mut Inner, tid: ThreadId, priority: i32) {
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.ready.push_back((priority, seq, tid));
        if let Some(tcb) = inner.threads.get_mut(&tid) {
            tcb.state = ThreadState::Ready;
        }
    }

    /// Highest priority first, FIFO among equal priorities.
    fn pop_ready_locked(&self, inner: &mut Inner) -> Option<ThreadId> {
        if inner.ready.is_empty() {
            return None;
        }
        let mut best = 0usize;
        for (i, (prio, seq, _)) in inner.ready.iter().enumerate() {
            let (best_prio, best_seq, _) = inner.ready[best];
            if *prio > best_prio || (*prio == best_prio && *seq < best_seq) {
                best = i;
            }
        }
        inner.ready.remove(best).map(|(_, _, tid)| tid)
    }

    fn dispatch_next_locked(&self, inner: &mut Inner) {
        let next = self.pop_ready_locked(inner);
        if let Some(tid) = next {
            if let Some(tcb) = inner.threads.get_mut(&tid) {
                tcb.state = ThreadState::Running;
            }
        }
        inner.running = next;
        self.cond.notify_all();
    }

    fn wait_for_turn(&self, tid: ThreadId) {
        let mut inner = self.inner.lock().unwrap();
        while inner.running != Some(tid) {
            inner = self.cond.wait(inner).unwrap();
        }
        trace!(%tid, "thread given the CPU");
    }

    /// Moves the current thread to ready and switches to the next one. A
    /// no-op if no other thread is ready.
    pub fn yield_now(&self, tid: ThreadId) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.ready.is_empty() {
                return;
            }
            let priority = inner.threads[&tid].priority;
            self.enqueue_ready_locked(&mut inner, tid, priority);
            self.dispatch_next_locked(&mut inner);
        }
        self.wait_for_turn(tid);
    }

    /// Blocks the current thread. The caller must already have arranged to
    /// be woken via `ready_to_run` (e.g. by enqueuing itself on a
    /// semaphore's wait list) before calling this.
    pub fn sleep(&self, tid: ThreadId) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.threads.get_mut(&tid).unwrap().state = ThreadState::Blocked;
            self.dispatch_next_locked(&mut inner);
        }
        self.wait_for_turn(tid);
    }

    /// Moves a blocked or new thread to ready.
    pub fn ready_to_run(&self, tid: ThreadId) {
        let mut inner = self.inner.lock().unwrap();
        let priority = match inner.threads.get(&tid) {
            Some(tcb) => tcb.priority,
            None => return,
        };
        self.enqueue_ready_locked(&mut inner, tid, priority);
        self.cond.notify_all();
    }

    fn finish(&self, tid: ThreadId) {
        let mut inner = self.inner.lock().unwrap();
        inner.threads.get_mut(&tid).unwrap().state = ThreadState::Finished;
        let waiters = inner.joiners.remove(&tid).unwrap_or_default();
        for waiter in waiters {
            let priority = inner.threads[&waiter].priority;
            self.enqueue_ready_locked(&mut inner, waiter, priority);
        }
        debug!(%tid, "thread finished");
        self.dispatch_next_locked(&mut inner);
    }

    /// Blocks `waiter` until `target` calls `finish`. Returns immediately
    /// if `target` has already finished.
    pub fn join(&self, waiter: ThreadId, target: ThreadId) {
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.threads.get(&target).map(|t| t.state) {
                None | Some(ThreadState::Finished) => return,
                _ => {}
            }
            inner.joiners.entry(target).or_default().push(waiter);
            inner.threads.get_mut(&waiter).unwrap().state = ThreadState::Blocked;
            self.dispatch_next_locked(&mut inner);
        }
        self.wait_for_turn(waiter);
    }

    /// Advances the simulated timer by one tick for the running thread.
    /// Once the time slice elapses, preempts immediately if interrupts are
    /// enabled, or records a pending preemption to deliver when they are
    /// next re-enabled.
    pub fn tick(&self, tid: ThreadId) {
        let mut should_preempt = false;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.ticks += 1;
            if let Some(tcb) = inner.threads.get_mut(&tid) {
                tcb.ticks_in_slice += 1;
                if tcb.ticks_in_slice >= TIME_SLICE {
                    tcb.ticks_in_slice = 0;
                    if inner.interrupts_enabled {
                        should_preempt = true;
                    } else {
                        inner.pending_preempt = true;
                    }
                }
            }
        }
        if should_preempt {
            trace!(%tid, "timer preemption");
            self.yield_now(tid);
        }
    }

    /// Disables or re-enables interrupts for the calling thread, returning
    /// the previous level. Re-enabling delivers a pending timer preemption.
    pub fn set_level(&self, tid: ThreadId, level: Level) -> Level {
        let mut deliver_preempt = false;
        let previous = {
            let mut inner = self.inner.lock().unwrap();
            let previous = if inner.interrupts_enabled { Level::Enabled } else { Level::Disabled };
            inner.interrupts_enabled = matches!(level, Level::Enabled);
            if inner.interrupts_enabled && inner.pending_preempt {
                inner.pending_preempt = false;
                deliver_preempt = true;
            }
            previous
        };
        if deliver_preempt {
            self.yield_now(tid);
        }
        previous
    }

    /// Brackets a critical section: disables interrupts now, restores the
    /// previous level when the returned guard drops.
    pub fn disable_interrupts(&self, tid: ThreadId) -> InterruptGuard<'_> {
        let previous = self.set_level(tid, Level::Disabled);
        InterruptGuard { scheduler: self, tid, previous }
    }

    pub fn state_of(&self, tid: ThreadId) -> Option<ThreadState> {
        self.inner.lock().unwrap().threads.get(&tid).map(|t| t.state)
    }

    /// Joins every spawned OS thread. Called once by the process's real
    /// main after the bootstrap thread has finished its own work, so the
    /// process doesn't exit while kernel threads are still runnable.
    pub fn join_os_threads(&self) {
        let handles: Vec<_> = std::mem::take(&mut self.inner.lock().unwrap().os_handles);
        for handle in handles {
            let _ = handle.join();
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}
