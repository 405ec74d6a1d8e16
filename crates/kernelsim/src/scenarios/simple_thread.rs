//! Port of `threadtest.cc`'s `SimpleThread`: each of `num_threads` forked
//! threads loops `num_yields` times, yielding the CPU back to the
//! scheduler every iteration, and records one line per iteration. Used as
//! the smoke test for `fork`/`yield`/`finish`.

use std::sync::{Arc, Mutex};

use kernelcore::threads::Scheduler;

pub fn run_simple_thread(scheduler: &Arc<Scheduler>, main: kernelcore::threads::ThreadId, num_threads: usize, num_yields: usize) -> Vec<String> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();

    for which in 0..num_threads {
        let log = Arc::clone(&log);
        let tid = scheduler
            .fork(format!("simple-{which}"), 0, move |scheduler, tid| {
                for iteration in 0..num_yields {
                    log.lock().unwrap().push(format!("thread {which} (tid {tid}) looped {iteration} times"));
                    scheduler.yield_now(tid);
                }
            })
            .expect("fork simple thread");
        handles.push(tid);
    }

    for tid in handles {
        scheduler.join(main, tid);
    }

    Arc::try_unwrap(log).unwrap().into_inner().unwrap()
}
