//! Collection aliases used across the pipeline.
//!
//! Maps keyed on small state enums use AHash.

pub use ahash::AHashMap as HashMap;
