//! Core plan logic: loading, parsing, validation, resolution, execution.

pub mod error;
pub mod executor;
pub mod expr;
pub mod loader;
pub mod parser;
pub mod placeholder;
pub mod resolver;
pub mod sop;
pub mod state;
pub mod types;
