//! The kernel simulator host process: configuration loading and the
//! built-in demo scenarios ported from the original test programs
//! (`threadtest.cc`'s `SimpleThread`, the filesystem write-read smoke
//! test). The CPU interpreter stays out of scope, so these scenarios drive
//! `kernelcore` directly rather than through a loaded user executable.

pub mod config;
pub mod scenarios;

pub use config::Config;
