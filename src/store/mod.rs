//! Durable engine state
//!
//! Per-caller dependency sets and the append-only run ledger.

pub mod deps;
pub mod ledger;
