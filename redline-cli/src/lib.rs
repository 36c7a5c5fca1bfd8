//! Library half of the `redline` CLI: configuration loading and merging.

pub mod config;
