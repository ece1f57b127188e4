//! Builders for constructing configurations programmatically.

pub mod config;
