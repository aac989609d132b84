//! Harvest orchestration.
//!
//! The harvester sequences batches strictly one after another: batch N+1
//! never begins before batch N's flush completes, so the persisted file is
//! always a consistent prefix of finished work and a rerun resumes exactly
//! where the last flush ended. Within a batch, per-timestamp work runs
//! concurrently with parallelism bounded by the batch size, then joins at a
//! barrier before merge and flush.

use crate::harvest::cache::{CacheEntry, ResumableCache};
use crate::harvest::decoder::PackageDecoder;
use crate::harvest::fetcher::{AttestationFetcher, AttestationIndex};
use crate::harvest::identity::OracleId;
use crate::harvest::planner::TimeWindow;
use crate::harvest::resolver::{BlockResolver, ChainSource};
use crate::index::gateway::PayloadStore;
use crate::runtime::config::{HarvestConfig, IncompletePolicy};
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The external collaborators one harvest run needs, grouped so they can be
/// shared across the per-timestamp tasks of a batch.
pub struct HarvesterServices<C, I, P>
where
    C: ChainSource,
    I: AttestationIndex,
    P: PayloadStore,
{
    pub resolver: BlockResolver<C>,
    pub fetcher: AttestationFetcher<I>,
    pub decoder: PackageDecoder<P>,
}

/// Final accounting of one run, logged and returned to the caller. A run
/// interrupted by cancellation reports `completed: false` but has lost
/// nothing that was already flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub requested: u64,
    pub already_cached: u64,
    pub refilled: u64,
    pub flushed_new: u64,
    pub batches: u64,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    LoadingCache,
    Planning,
    FetchingBatch,
    Flushing,
    Done,
    Failed,
}

enum BatchOutcome {
    Flushed(u64),
    Cancelled,
}

pub struct Harvester<C, I, P>
where
    C: ChainSource + 'static,
    I: AttestationIndex + 'static,
    P: PayloadStore + 'static,
{
    config: HarvestConfig,
    services: Arc<HarvesterServices<C, I, P>>,
    oracles: Arc<Vec<OracleId>>,
    cache: ResumableCache,
    telemetry: Arc<Telemetry>,
    phase: Phase,
}

impl<C, I, P> Harvester<C, I, P>
where
    C: ChainSource + 'static,
    I: AttestationIndex + 'static,
    P: PayloadStore + 'static,
{
    pub fn new(config: HarvestConfig, services: HarvesterServices<C, I, P>) -> Self {
        let cache = ResumableCache::new(config.cache_path());
        let oracles = Arc::new(config.oracles().to_vec());
        Self {
            config,
            services: Arc::new(services),
            oracles,
            cache,
            telemetry: Arc::new(Telemetry::default()),
            phase: Phase::Idle,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResumableCache {
        &self.cache
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Runs the harvest to completion or cancellation.
    ///
    /// Per-timestamp failures are tolerated and leave empty slots; only an
    /// unreadable cache file (never overwritten) or a task panic aborts the
    /// run with an error.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> Result<RunSummary> {
        let start = self.config.start_timestamp();
        let end = self.config.end_timestamp();
        let step = self.config.step_secs();
        let batch_size = self.config.batch_size();

        self.transition(Phase::LoadingCache);
        if let Err(err) = self.cache.load() {
            self.transition(Phase::Failed);
            return Err(anyhow::Error::new(err)
                .context("refusing to run against an unreadable cache file"));
        }

        let requested = TimeWindow::generate(start, end, step, batch_size)?.len();
        let already_cached = TimeWindow::generate(start, end, step, batch_size)?
            .flatten()
            .filter(|timestamp| self.cache.contains(*timestamp))
            .count() as u64;

        let refill_targets = match self.config.incomplete_policy() {
            IncompletePolicy::KeepProcessed => Vec::new(),
            IncompletePolicy::Refill => self.cache.incomplete_timestamps(self.oracles.len()),
        };

        let resume = match self.cache.greatest_timestamp() {
            Some(greatest) => greatest.saturating_add(step).max(start),
            None => start,
        };

        tracing::info!(
            start,
            end,
            step,
            batch_size,
            resume,
            cached_entries = self.cache.len(),
            refill_targets = refill_targets.len(),
            "starting harvest run"
        );

        let mut summary = RunSummary {
            requested,
            already_cached,
            refilled: 0,
            flushed_new: 0,
            batches: 0,
            completed: false,
        };

        for chunk in refill_targets.chunks(batch_size) {
            match self.process_batch(chunk, true, shutdown).await? {
                BatchOutcome::Flushed(count) => {
                    summary.refilled += count;
                    summary.batches += 1;
                }
                BatchOutcome::Cancelled => return Ok(self.finish(summary, false)),
            }
        }

        if resume <= end {
            self.transition(Phase::Planning);
            let planner = TimeWindow::generate(resume, end, step, batch_size)?;
            for batch in planner {
                match self.process_batch(&batch, false, shutdown).await? {
                    BatchOutcome::Flushed(count) => {
                        summary.flushed_new += count;
                        summary.batches += 1;
                    }
                    BatchOutcome::Cancelled => return Ok(self.finish(summary, false)),
                }
                self.transition(Phase::Planning);
            }
        }

        Ok(self.finish(summary, true))
    }

    /// Resolves, fetches, and decodes every timestamp of one batch
    /// concurrently, joins at the barrier, then merges and flushes.
    ///
    /// Cancellation mid-batch discards the in-flight work without flushing;
    /// the next run re-harvests those timestamps.
    async fn process_batch(
        &mut self,
        timestamps: &[u64],
        replace: bool,
        shutdown: &CancellationToken,
    ) -> Result<BatchOutcome> {
        if timestamps.is_empty() {
            return Ok(BatchOutcome::Flushed(0));
        }
        if shutdown.is_cancelled() {
            return Ok(BatchOutcome::Cancelled);
        }

        self.transition(Phase::FetchingBatch);
        let started = Instant::now();

        let mut tasks: JoinSet<(u64, CacheEntry)> = JoinSet::new();
        for &timestamp in timestamps {
            let services = Arc::clone(&self.services);
            let oracles = Arc::clone(&self.oracles);
            let telemetry = Arc::clone(&self.telemetry);
            tasks.spawn(async move {
                let entry = harvest_one(&services, &oracles, &telemetry, timestamp).await;
                (timestamp, entry)
            });
        }

        let mut completed: BTreeMap<u64, CacheEntry> = BTreeMap::new();
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((timestamp, entry))) => {
                        completed.insert(timestamp, entry);
                    }
                    Some(Err(err)) => {
                        tasks.abort_all();
                        return Err(anyhow::Error::new(err)
                            .context("per-timestamp harvest task panicked"));
                    }
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    tracing::info!(
                        pending = tasks.len(),
                        "cancellation requested; discarding in-flight batch"
                    );
                    tasks.abort_all();
                    return Ok(BatchOutcome::Cancelled);
                }
            }
        }

        self.transition(Phase::Flushing);
        let merged = completed.len() as u64;
        for (timestamp, entry) in completed {
            if replace {
                self.cache.replace(timestamp, entry);
            } else {
                self.cache.put(timestamp, entry)?;
            }
        }
        self.cache.flush().context("failed to flush cache snapshot")?;
        self.telemetry.record_flush();

        tracing::info!(
            batch_end = timestamps.last().copied().unwrap_or_default(),
            entries = merged,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch flushed"
        );

        Ok(BatchOutcome::Flushed(merged))
    }

    fn finish(&mut self, mut summary: RunSummary, completed: bool) -> RunSummary {
        summary.completed = completed;
        self.transition(if completed { Phase::Done } else { Phase::Idle });

        let covered = summary.already_cached + summary.flushed_new;
        tracing::info!(
            requested = summary.requested,
            covered,
            flushed_new = summary.flushed_new,
            refilled = summary.refilled,
            batches = summary.batches,
            completed,
            "harvest run finished"
        );
        summary
    }

    fn transition(&mut self, next: Phase) {
        tracing::trace!(from = ?self.phase, to = ?next, "harvester phase change");
        self.phase = next;
    }
}

/// Assembles one timestamp's cache entry: resolve the block, query the index
/// once per oracle identity, decode what came back. Every failure mode ends
/// as an empty slot, never as an aborted batch.
async fn harvest_one<C, I, P>(
    services: &HarvesterServices<C, I, P>,
    oracles: &[OracleId],
    telemetry: &Telemetry,
    timestamp: u64,
) -> CacheEntry
where
    C: ChainSource,
    I: AttestationIndex,
    P: PayloadStore,
{
    let resolved = match services.resolver.resolve(timestamp).await {
        Ok(resolved) => {
            telemetry.record_resolved_block();
            resolved
        }
        Err(err) => {
            telemetry.record_resolution_failure();
            telemetry.record_empty_slots(oracles.len() as u64);
            tracing::warn!(
                timestamp,
                error = %err,
                "block resolution failed; recording empty entry"
            );
            return vec![Vec::new(); oracles.len()];
        }
    };

    let records = services
        .fetcher
        .fetch_all(resolved.bucketed_timestamp, oracles)
        .await;
    telemetry.record_fetched_records(records.iter().flatten().count() as u64);

    let mut entry = CacheEntry::with_capacity(oracles.len());
    for slot in records {
        let points = match slot {
            Some(record) => match services.decoder.decode(&record).await {
                Ok(package) => {
                    telemetry.record_decoded_package();
                    package.data_points
                }
                Err(err) => {
                    tracing::warn!(
                        timestamp,
                        bucketed_timestamp = resolved.bucketed_timestamp,
                        oracle = %record.oracle,
                        error = %err,
                        "package decode failed; leaving slot empty"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        if points.is_empty() {
            telemetry.record_empty_slots(1);
        }
        entry.push(points);
    }

    entry
}
