//! Language-agnostic execution core.
//!
//! Owns the request/reply contract, the admission gate and the coordinator
//! that drives a run from request to ledger entry. Language-specific
//! compile/run logic lives in judge pipelines.

pub mod coordinator;
pub mod gate;
pub mod request;
pub mod types;
