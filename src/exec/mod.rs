//! Execution control
//!
//! Launches one child per phase with limits, a deadline and capped output.

pub mod runner;
