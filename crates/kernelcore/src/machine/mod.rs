//! Simulated devices: the disk and console the filesystem and syscall
//! layers sit on top of.

pub mod console;
pub mod disk;

pub use console::{Console, InMemoryConsole, SynchConsole};
pub use disk::{Disk, FileBackedDisk, InMemoryDisk, SynchDisk};
