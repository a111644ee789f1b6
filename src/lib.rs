//! Core library for the `woodpecker` distributed load generator.
//!
//! A controller partitions a scenario's peak concurrency across spawner
//! hosts; each spawner keeps its peckers converged to the scenario's ramps
//! and ships buffered telemetry to a collector that persists it in SQLite.
//! The primary interface is the `woodpecker` binary; library APIs may evolve
//! with it.
pub mod archive;
pub mod args;
pub mod config;
pub mod controller;
pub mod entry;
pub mod error;
pub mod logger;
pub mod messenger;
pub mod navigation;
pub mod scenario;
pub mod shutdown;
pub mod spawner;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
mod test_support;
