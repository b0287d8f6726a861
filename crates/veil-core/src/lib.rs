//! Veil Core
//!
//! Shared utilities for the Veil alpha pipeline: logging bootstrap, profiling
//! hooks and collection aliases.

pub mod alloc;
pub mod logging;
pub mod profiling;
