//! Synchronization primitives layered on top of the scheduler's sleep/wake
//! queues: semaphores, locks, Mesa condition variables, barriers, and a
//! reader-writer lock.

pub mod barrier;
pub mod condvar;
pub mod lock;
pub mod rwlock;
pub mod semaphore;

pub use barrier::Barrier;
pub use condvar::CondVar;
pub use lock::Lock;
pub use rwlock::RwLock;
pub use semaphore::Semaphore;
