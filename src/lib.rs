//! sopflow: dependency-driven execution of tool-calling plans.
//!
//! A plan is a list of steps, each naming a tool, its inputs, the steps it
//! depends on and an optional activation guard. Inputs reference earlier
//! outputs with `${step.field}` placeholders.

pub mod cli;
pub mod config;
pub mod core;
pub mod history;
pub mod logging;
pub mod tools;
