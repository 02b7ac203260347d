//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Local shell command execution

pub mod command;
