//! Integration tests: full cycles against an in-memory chain.

mod mock_chain;
mod cycle;
mod scheduling;
