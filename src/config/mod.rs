//! Configuration
//!
//! Shared types, the built-in language table, the JSON engine config and
//! its startup validation.

pub mod engine;
pub mod presets;
pub mod types;
pub mod validator;
