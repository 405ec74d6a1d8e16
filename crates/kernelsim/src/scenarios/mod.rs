//! Built-in demo scenarios, ported from the original test programs
//! (`threadtest.cc`, `filetest`-style write-read checks) to drive
//! `kernelcore` directly since the CPU interpreter is out of scope.

pub mod simple_thread;
pub mod write_read;

pub use simple_thread::run_simple_thread;
pub use write_read::run_write_read;
