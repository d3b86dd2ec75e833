//! snipbox: sandboxed multi-language snippet execution
//!
//! Takes a snippet plus an optional language hint, runs it under kernel
//! resource limits and a wall-clock deadline, and returns captured output
//! with a status. Every run gets a private workspace that is always removed,
//! and every completed run is appended to a durable ledger.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::rlimit`]: CPU, address-space and core-dump limits applied before exec
//! - [`kernel::signal`]: Process-group termination
//!
//! ## Execution Control ([`exec`])
//! - [`exec::runner`]: One child per phase, deadline, capped output
//!
//! ## Core ([`core`](crate::core))
//! - [`core::coordinator`](crate::core::coordinator): `Engine::execute` and the `Executor` trait
//! - [`core::gate`](crate::core::gate): Admission gate bounding in-flight runs
//! - [`core::request`](crate::core::request): Chat-style message grammar
//! - [`core::types`](crate::core::types): Request and reply types
//!
//! ## Language Pipelines ([`judge`])
//! - [`judge::pipeline`]: Install/compile/run recipes and argv templates
//! - [`judge::registry`]: Language → pipeline table
//! - [`judge::detect`]: Heuristic language detection
//!
//! ## Durable State ([`store`])
//! - [`store::deps`]: Per-caller package sets
//! - [`store::ledger`]: Append-only run history
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::workspace`]: Run-scoped directories with guaranteed disposal
//!
//! ## Configuration ([`config`])
//! - [`config::engine`]: JSON engine configuration
//! - [`config::validator`]: Startup validation
//! - [`config::presets`]: Built-in language table
//! - [`config::types`]: Shared types and errors
//!
//! ## Utilities ([`utils`])
//! - [`utils::output`]: Bounded output collection
//!
//! # Example
//!
//! ```no_run
//! use snipbox::{Engine, EngineConfig, ExecutionRequest};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let reply = engine.execute(&ExecutionRequest::new("alice", "print('hi')").with_language("py"))?;
//! println!("{} {}", reply.status, reply.stdout);
//! # Ok::<(), snipbox::SandboxError>(())
//! ```

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Request handling and orchestration
pub mod core;

// Language pipelines
pub mod judge;

// Durable state
pub mod store;

// Safety & Cleanup
pub mod safety;

// Configuration
pub mod config;

// Utilities
pub mod utils;

// CLI entrypoint wiring for the snipbox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use crate::config::engine::EngineConfig;
pub use crate::config::types::*;
pub use crate::core::coordinator::{Engine, Executor};
pub use crate::core::types::{ExecutionReply, ExecutionRequest};
pub use crate::store::ledger::LedgerEntry;
