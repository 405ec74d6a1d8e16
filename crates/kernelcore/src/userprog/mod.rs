//! User-program loading surface: the NOFF executable format and the
//! register-level CPU interface the syscall dispatcher needs. The MIPS
//! interpreter itself stays out of scope; these traits make the loader and
//! dispatcher testable without one.

pub mod cpu;
pub mod noff;

pub use cpu::{CpuRegisterLayout, CpuRegisters, FakeCpu};
pub use noff::{NoffError, NoffHeader, NoffImage, Segment, UserProgramImage};
