//! Application layer orchestrating the order lifecycle.
//!
//! `OrderEngine` is the entry point for every buyer and seller action. `DisputeResolver` and
//! `OverdueSweeper` drive the arbiter and system transitions through the same engine, so every
//! write goes through one versioned read-decide-commit cycle.

pub mod engine;
pub mod resolver;
pub mod sweeper;
