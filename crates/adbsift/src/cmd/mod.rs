//! CLI command modules.

pub mod dump;
pub mod extract;
