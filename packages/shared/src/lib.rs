//! Utilities shared by the snoochat crates.

pub mod logger;
pub mod time;
