//! Thin wrappers around Linux kernel primitives.
//!
//! Every `unsafe` block in the crate lives here, including the `pre_exec`
//! hook the runner registers through [`rlimit::install`]. `rlimit` runs
//! between fork and exec and must stay async-signal-safe; `signal` tears
//! down process groups.

pub mod rlimit;
pub mod signal;
