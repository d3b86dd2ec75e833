//! Language pipelines.
//!
//! The engine stays language-agnostic: a pipeline describes how to lay out,
//! compile and run one language, the registry maps identifiers to
//! pipelines, and the detector guesses a language when the caller gives no
//! hint.

pub mod detect;
pub mod pipeline;
pub mod registry;
