//! Core harvesting pipeline: time-window planning, block resolution,
//! per-oracle attestation fetching and decoding, and the resumable cache the
//! orchestrator flushes between batches.

pub mod cache;
pub mod decoder;
pub mod fetcher;
pub mod harvester;
pub mod identity;
pub mod planner;
pub mod resolver;
