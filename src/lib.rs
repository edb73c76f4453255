//! CDP spammer: autonomous randomized activity generator for a Kava CDP.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod chain;
pub mod engine;
