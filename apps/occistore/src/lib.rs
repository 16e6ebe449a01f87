//! # occistore
//!
//! Library half of the occistore binary: the HTTP protocol adapter, the CLI
//! and configuration loading. Exposed for integration tests.

pub mod api;
pub mod cli;
pub mod config;
