//! Core engine: the params → balance → position → decide → submit loop.

pub mod decision;
pub mod orchestrator;
pub mod scheduler;
