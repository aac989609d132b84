//! Process-level plumbing: configuration, tracing and counters, and the
//! runner that wires the services together and owns shutdown.

pub mod config;
pub mod runner;
pub mod telemetry;
