//! Schema module - Configuration types for optimization runs.

mod config;

pub use config::*;
