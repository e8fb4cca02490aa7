//! Plansync - worker and admin CLI
//!
//! Runs the worker pool against a SQLite-backed queue and lock table, and
//! exposes the queue, lock and document stores for inspection.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cli;
pub mod commands;
pub mod db;
