//! Property-based invariant checks for [`kernelcore`]'s core data
//! structures, run against random operation sequences rather than fixed
//! examples. See `tests/invariants.rs`.
