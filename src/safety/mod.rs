//! Safety and cleanup
//!
//! Run-scoped workspaces that are always removed, plus a startup sweep for
//! directories left behind by a crashed process.

pub mod workspace;
