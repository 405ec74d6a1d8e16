//! Kernel error kinds.
//!
//! Hardware-level faults ([`VmError`]) and filesystem-level failures
//! ([`FsError`]) are distinct closed sets, matching the way the simulated
//! CPU's trap handler and the filesystem's boolean return codes are kept
//! separate in the source system. [`SyscallError`] is the syscall-layer
//! view that the dispatcher converts both of the above into.

use std::fmt;

/// Hardware-level faults raised by address translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    /// Misaligned or out-of-range virtual address.
    #[error("address error at {addr:#x} (size {size})")]
    AddressError { addr: usize, size: usize },

    /// Valid page table entry but the translation wasn't found in the TLB.
    #[error("TLB miss for vpn {vpn}")]
    TlbMiss { vpn: usize },

    /// No valid translation for this virtual page in the page table.
    #[error("page fault for vpn {vpn}")]
    PageFault { vpn: usize },

    /// Write to a page marked read-only.
    #[error("write to read-only page at vpn {vpn}")]
    ReadOnly { vpn: usize },

    /// Translation points at a frame outside physical memory.
    #[error("bus error: frame {frame} out of range")]
    BusError { frame: usize },
}

/// Filesystem-level failures, returned as `Result` and mapped to -1 at the
/// syscall boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("no such path: {0}")]
    NoSuchPath(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no space left (need {needed} sectors, {available} free)")]
    NoSpace { needed: usize, available: usize },

    #[error("{0} is not a directory")]
    WrongType(String),

    #[error("{0} is open (refcount > 0)")]
    Busy(String),

    #[error("directory {0} is full")]
    DirectoryFull(String),
}

/// Syscall-layer failures surfaced to user programs as a `-1` return value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyscallError {
    #[error("bad file descriptor {0}")]
    BadFileDescriptor(i32),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("too many threads (limit reached)")]
    TooManyThreads,

    #[error(transparent)]
    Fs(#[from] FsError),
}

impl From<FsError> for i32 {
    fn from(_: FsError) -> Self {
        -1
    }
}

impl From<SyscallError> for i32 {
    fn from(_: SyscallError) -> Self {
        -1
    }
}

/// A kernel invariant was violated (double free, dangling frame reference,
/// scheduling a non-runnable thread). These are not recoverable: the
/// simulator halts, the same way an `ASSERT` failure aborts the original
/// system.
pub struct FatalInvariant {
    pub message: String,
}

impl fmt::Display for FatalInvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal kernel invariant violation: {}", self.message)
    }
}

/// Logs the violated invariant at `error!` and halts the simulator.
///
/// Mirrors the source system's `ASSERT(...)`-fails-the-whole-machine
/// convention: there is no way to recover from a corrupted kernel
/// invariant, so this never returns.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        tracing::error!(%message, "fatal kernel invariant violation");
        panic!("fatal kernel invariant violation: {message}");
    }};
}
