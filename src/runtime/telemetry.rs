use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive run metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    resolved_blocks: AtomicU64,
    resolution_failures: AtomicU64,
    fetched_records: AtomicU64,
    decoded_packages: AtomicU64,
    empty_slots: AtomicU64,
    flushes: AtomicU64,
}

impl Telemetry {
    pub fn record_resolved_block(&self) {
        self.resolved_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolution_failure(&self) {
        self.resolution_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetched_records(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.fetched_records.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_decoded_package(&self) {
        self.decoded_packages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_slots(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.empty_slots.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            resolved_blocks: self.resolved_blocks.load(Ordering::Relaxed),
            resolution_failures: self.resolution_failures.load(Ordering::Relaxed),
            fetched_records: self.fetched_records.load(Ordering::Relaxed),
            decoded_packages: self.decoded_packages.load(Ordering::Relaxed),
            empty_slots: self.empty_slots.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub resolved_blocks: u64,
    pub resolution_failures: u64,
    pub fetched_records: u64,
    pub decoded_packages: u64,
    pub empty_slots: u64,
    pub flushes: u64,
}
