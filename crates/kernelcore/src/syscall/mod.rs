//! The syscall boundary: the operation set ([`ops`]) and the dispatcher
//! that executes a trapped syscall against a [`crate::context::KernelContext`]
//! ([`dispatch`]).

pub mod dispatch;
pub mod ops;

pub use dispatch::dispatch;
pub use ops::{PrintMode, RawArgs, Syscall, CONSOLE_INPUT, CONSOLE_OUTPUT};
